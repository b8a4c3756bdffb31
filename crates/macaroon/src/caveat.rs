use serde::{Deserialize, Serialize};

/// A condition attached to a macaroon.
///
/// First-party caveats are evaluated locally by whoever verifies the
/// macaroon; third-party caveats require a discharge macaroon from the
/// named location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Caveat {
    FirstParty {
        predicate: String,
    },
    ThirdParty {
        location: String,
        /// Opaque to everyone but the discharger: the bytes a discharger's
        /// checker receives back verbatim to decide the condition.
        #[serde(with = "crate::b64_bytes")]
        caveat_id: Vec<u8>,
        /// `root_key` sealed to the discharger's public key; see
        /// `crypto::seal`.
        #[serde(with = "crate::b64_bytes")]
        verification_id: Vec<u8>,
    },
}

impl Caveat {
    #[must_use]
    pub fn as_first_party(&self) -> Option<&str> {
        match self {
            Caveat::FirstParty { predicate } => Some(predicate),
            Caveat::ThirdParty { .. } => None,
        }
    }

    #[must_use]
    pub fn as_third_party(&self) -> Option<(&str, &[u8], &[u8])> {
        match self {
            Caveat::ThirdParty {
                location,
                caveat_id,
                verification_id,
            } => Some((location, caveat_id, verification_id)),
            Caveat::FirstParty { .. } => None,
        }
    }
}

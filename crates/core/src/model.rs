// Copyright 2026 The Bakery Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bakery_macaroon::Public;
use serde::{Deserialize, Serialize};

use crate::version::BakeryVersion;

/// The decrypted view of a third-party caveat that a discharger's checker
/// callback is handed: everything it needs to decide whether, and with
/// what further caveats, to discharge.
#[derive(Debug, Clone)]
pub struct ThirdPartyCaveatInfo {
    /// The caveat condition, opaque to the protocol and meaningful only to
    /// the checker (e.g. `"is-member-of: admins"`).
    pub condition: Vec<u8>,
    pub caveat_id: Vec<u8>,
    /// The caveat body supplied independently of the id, if any.
    pub caveat: Vec<u8>,
    /// The root key this discharge macaroon must be minted with, recovered
    /// by opening the sealed verification id.
    pub root_key: Vec<u8>,
    pub first_party_public_key: Option<Public>,
    pub discharger_public_key: Public,
    pub macaroon_id: Vec<u8>,
    pub namespace: String,
}

/// What a third-party locator (C3) returns for a discharger location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThirdPartyInfo {
    pub public_key: Public,
    pub version: BakeryVersion,
}

/// An opaque proof of interaction a discharger may re-present later to
/// bypass interaction for the same caveat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeToken {
    pub kind: String,
    #[serde(with = "bakery_macaroon_b64::bytes")]
    pub value: Vec<u8>,
}

/// Encodes [`DischargeToken::value`] the same way the macaroon crate encodes
/// caveat ids, so dischargers and clients agree on the wire shape without
/// `bakery-core` depending on the macaroon crate's private helpers.
mod bakery_macaroon_b64 {
    pub mod bytes {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
            URL_SAFE_NO_PAD.encode(bytes).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
            let s = String::deserialize(d)?;
            URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
        }
    }
}

/// What a checker callback (discharger's [`crate::Error`]-producing check,
/// or a target's oven) asks to have baked into a macaroon it is minting.
///
/// Mirrors the external discharge primitive's `AddCaveat`: the checker
/// never touches macaroon internals directly, it only describes caveats in
/// this decrypted, pre-sealing shape and leaves minting to the holder of
/// the macaroon (the discharger or oven).
#[derive(Debug, Clone)]
pub enum NewCaveat {
    FirstParty(String),
    ThirdParty {
        location: String,
        condition: String,
        discharger_public_key: Public,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discharge_token_round_trips() {
        let token = DischargeToken {
            kind: "agent".to_owned(),
            value: b"opaque proof".to_vec(),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: DischargeToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "agent");
        assert_eq!(back.value, b"opaque proof");
    }
}

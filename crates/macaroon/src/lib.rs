//! Macaroon tokens with first- and third-party caveats.
//!
//! This crate is the one concrete implementation of the macaroon crypto
//! primitive that the rest of the workspace treats as an external
//! collaborator (mint, add caveat, bind, verify). No other crate reaches
//! into its internals; everything crosses at [`Macaroon`], [`Caveat`] and
//! [`KeyPair`].

mod b64_bytes;
mod caveat;
mod crypto;
mod error;
mod keypair;

pub use caveat::Caveat;
pub use error::{MacaroonError, VerificationError};
pub use keypair::{KeyPair, Public};

use serde::{Deserialize, Serialize};

/// An opaque, verifiable, immutable bearer token: a location, an identifier,
/// a list of caveats, and a signature chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Macaroon {
    identifier: Vec<u8>,
    location: Option<String>,
    signature: [u8; 32],
    caveats: Vec<Caveat>,
}

impl Macaroon {
    /// Mint a fresh macaroon for `identifier`, signed with `root_key`.
    #[must_use]
    pub fn new(root_key: &[u8], identifier: impl Into<Vec<u8>>, location: Option<String>) -> Self {
        let identifier = identifier.into();
        let derived = crypto::derive_key(root_key);
        let signature = crypto::hmac256(&derived, &identifier);
        Self {
            identifier,
            location,
            signature,
            caveats: Vec::new(),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    #[must_use]
    pub fn signature(&self) -> &[u8; 32] {
        &self.signature
    }

    #[must_use]
    pub fn signature_hex(&self) -> String {
        self.signature.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[must_use]
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// Append a first-party caveat and fold it into the running signature.
    pub fn add_first_party_caveat(&mut self, predicate: impl Into<String>) {
        let predicate = predicate.into();
        self.signature = crypto::sign_first_party(&self.signature, predicate.as_bytes());
        self.caveats.push(Caveat::FirstParty { predicate });
    }

    /// Append a third-party caveat addressed to `discharger_public_key`.
    ///
    /// `third_party_root_key` is the secret the discharge macaroon will be
    /// minted with; the caller chooses it (see `bakery-core`'s root key
    /// store) because this crate has no opinion on whether keys are random
    /// and session-scoped or deterministically derived for stateless
    /// verification.
    pub fn add_third_party_caveat(
        &mut self,
        rng: &mut (impl rand::RngCore + rand::CryptoRng),
        location: impl Into<String>,
        third_party_root_key: &[u8],
        discharger_public_key: &Public,
        caveat_id: impl Into<Vec<u8>>,
    ) -> Result<(), MacaroonError> {
        let caveat_id = caveat_id.into();
        let verification_id = crypto::seal(rng, &discharger_public_key.as_dalek(), third_party_root_key)?;

        self.signature = crypto::sign_third_party(&self.signature, &verification_id, &caveat_id);
        self.caveats.push(Caveat::ThirdParty {
            location: location.into(),
            caveat_id,
            verification_id,
        });
        Ok(())
    }

    /// Recover a third-party caveat's root key, as the discharger holding
    /// `keypair`'s private half would when discharging.
    pub fn open_third_party_root_key(
        keypair: &KeyPair,
        verification_id: &[u8],
    ) -> Result<Vec<u8>, MacaroonError> {
        crypto::open(&keypair.as_dalek_secret(), verification_id)
    }

    /// Rebind `discharge`'s signature to this root macaroon's, so it only
    /// verifies when presented alongside this exact root.
    pub fn bind_for_request(&self, discharge: &mut Macaroon) {
        discharge.signature = crypto::bind_signature(&self.signature, &discharge.signature);
    }

    /// Verify this macaroon against `root_key`, using `discharges` to
    /// satisfy any third-party caveats and `check` to decide first-party
    /// ones. `resolve_discharge_root_key` recovers the root key a given
    /// discharge macaroon was minted with (see the module docs on why this
    /// crate does not attempt that itself).
    pub fn verify(
        &self,
        root_key: &[u8],
        discharges: &[Macaroon],
        resolve_discharge_root_key: &mut dyn FnMut(&[u8]) -> Option<Vec<u8>>,
        check: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), VerificationError> {
        let mut used = vec![false; discharges.len()];
        self.verify_inner(
            root_key,
            self.signature,
            discharges,
            &mut used,
            resolve_discharge_root_key,
            check,
        )
    }

    fn verify_inner(
        &self,
        root_key: &[u8],
        root_signature: [u8; 32],
        discharges: &[Macaroon],
        used: &mut [bool],
        resolve_discharge_root_key: &mut dyn FnMut(&[u8]) -> Option<Vec<u8>>,
        check: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), VerificationError> {
        let derived = crypto::derive_key(root_key);
        let mut running = crypto::hmac256(&derived, &self.identifier);

        for caveat in &self.caveats {
            match caveat {
                Caveat::FirstParty { predicate } => {
                    running = crypto::sign_first_party(&running, predicate.as_bytes());
                    if !check(predicate) {
                        return Err(VerificationError::CaveatRejected(predicate.clone()));
                    }
                }
                Caveat::ThirdParty {
                    caveat_id,
                    verification_id,
                    ..
                } => {
                    running = crypto::sign_third_party(&running, verification_id, caveat_id);

                    let idx = discharges
                        .iter()
                        .position(|d| d.identifier == *caveat_id)
                        .ok_or_else(|| {
                            VerificationError::DischargeNotFound(String::from_utf8_lossy(caveat_id).into_owned())
                        })?;
                    if used[idx] {
                        return Err(VerificationError::DuplicateDischarge(
                            String::from_utf8_lossy(caveat_id).into_owned(),
                        ));
                    }
                    used[idx] = true;

                    let discharge_root_key = resolve_discharge_root_key(caveat_id).ok_or_else(|| {
                        VerificationError::DischargeNotFound(String::from_utf8_lossy(caveat_id).into_owned())
                    })?;

                    let discharge = &discharges[idx];
                    discharge.verify_inner(
                        &discharge_root_key,
                        root_signature,
                        discharges,
                        used,
                        resolve_discharge_root_key,
                        check,
                    )?;

                    let expected_bound = crypto::bind_signature(&root_signature, &discharge.expected_unbound_signature(&discharge_root_key));
                    if expected_bound != discharge.signature {
                        return Err(VerificationError::NotBound(String::from_utf8_lossy(caveat_id).into_owned()));
                    }
                }
            }
        }

        if root_signature == self.signature {
            // This is the root macaroon itself: compare the freshly computed
            // chain against the stored signature directly.
            if running != self.signature {
                return Err(VerificationError::SignatureMismatch);
            }
        }

        Ok(())
    }

    /// Recompute what this macaroon's own (unbound) signature would be, for
    /// binding comparisons.
    fn expected_unbound_signature(&self, root_key: &[u8]) -> [u8; 32] {
        let derived = crypto::derive_key(root_key);
        let mut running = crypto::hmac256(&derived, &self.identifier);
        for caveat in &self.caveats {
            running = match caveat {
                Caveat::FirstParty { predicate } => crypto::sign_first_party(&running, predicate.as_bytes()),
                Caveat::ThirdParty {
                    caveat_id,
                    verification_id,
                    ..
                } => crypto::sign_third_party(&running, verification_id, caveat_id),
            };
        }
        running
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MacaroonError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, MacaroonError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand_chacha::ChaCha20Rng {
        rand_chacha::ChaCha20Rng::seed_from_u64(7)
    }

    #[test]
    fn first_party_only_round_trip() {
        let root_key = b"target secret";
        let mut m = Macaroon::new(root_key, "id-1", Some("https://target.example".into()));
        m.add_first_party_caveat("is something");

        let mut checks = 0;
        let result = m.verify(
            root_key,
            &[],
            &mut |_| None,
            &mut |p| {
                checks += 1;
                p == "is something"
            },
        );
        assert!(result.is_ok());
        assert_eq!(checks, 1);
    }

    #[test]
    fn rejects_wrong_root_key() {
        let m = Macaroon::new(b"correct", "id", None);
        let result = m.verify(b"wrong", &[], &mut |_| None, &mut |_| true);
        assert_eq!(result, Err(VerificationError::SignatureMismatch));
    }

    #[test]
    fn third_party_caveat_discharge_and_bind() {
        let mut rng = rng();
        let discharger = KeyPair::generate(&mut rng);

        let root_key = b"target secret";
        let mut root = Macaroon::new(root_key, "root-id", Some("https://target.example".into()));

        let third_party_root_key = b"shared secret for discharge";
        root.add_third_party_caveat(
            &mut rng,
            "https://idp.example",
            third_party_root_key,
            &discharger.public(),
            "cav-1",
        )
        .unwrap();

        // The discharger recovers the root key and mints a bound discharge.
        let caveat = root.caveats()[0].as_third_party().unwrap();
        let recovered = Macaroon::open_third_party_root_key(&discharger, caveat.2).unwrap();
        assert_eq!(recovered, third_party_root_key);

        let mut discharge = Macaroon::new(&recovered, "cav-1", Some("https://idp.example".into()));
        discharge.add_first_party_caveat("test pass");
        root.bind_for_request(&mut discharge);

        let result = root.verify(
            root_key,
            &[discharge],
            &mut |id| if id == b"cav-1" { Some(third_party_root_key.to_vec()) } else { None },
            &mut |_| true,
        );
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn rejects_duplicate_discharge_use() {
        let mut rng = rng();
        let discharger = KeyPair::generate(&mut rng);
        let root_key = b"target secret";
        let mut root = Macaroon::new(root_key, "root-id", None);
        let tp_key = b"tp-key";
        root.add_third_party_caveat(&mut rng, "https://idp.example", tp_key, &discharger.public(), "cav-1")
            .unwrap();
        root.add_third_party_caveat(&mut rng, "https://idp.example", tp_key, &discharger.public(), "cav-1")
            .unwrap();

        let mut discharge = Macaroon::new(tp_key, "cav-1", None);
        root.bind_for_request(&mut discharge);

        let result = root.verify(
            root_key,
            &[discharge],
            &mut |_| Some(tp_key.to_vec()),
            &mut |_| true,
        );
        assert!(matches!(result, Err(VerificationError::DuplicateDischarge(_))));
    }

    #[test]
    fn json_round_trip() {
        let mut m = Macaroon::new(b"k", "id", Some("loc".into()));
        m.add_first_party_caveat("x = 1");
        let json = m.to_json().unwrap();
        let back = Macaroon::from_json(&json).unwrap();
        assert_eq!(back.signature(), m.signature());
        assert_eq!(back.caveats().len(), 1);
    }
}

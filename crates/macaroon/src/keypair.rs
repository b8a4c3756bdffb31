use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// A Curve25519 public key, shareable and used to address third-party
/// caveats at a discharger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Public(#[serde(with = "b64_array")] pub [u8; 32]);

impl Public {
    #[must_use]
    pub fn as_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for Public {
    fn from(value: PublicKey) -> Self {
        Self(*value.as_bytes())
    }
}

/// A Curve25519 key pair: a per-actor secret and its corresponding public key.
///
/// Private keys never implement `Serialize`/`Deserialize` directly with
/// `Debug`; callers that need to persist one go through [`KeyPair::to_bytes`]
/// and are responsible for storing the result securely.
#[derive(Clone)]
pub struct KeyPair {
    secret: Zeroizing<[u8; 32]>,
    public: Public,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret.to_bytes()),
            public: Public(*public.as_bytes()),
        }
    }

    /// Reconstruct a key pair from a previously generated secret.
    #[must_use]
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self {
            secret: Zeroizing::new(secret.to_bytes()),
            public: Public(*public.as_bytes()),
        }
    }

    #[must_use]
    pub fn public(&self) -> Public {
        self.public
    }

    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        *self.secret
    }

    pub(crate) fn as_dalek_secret(&self) -> StaticSecret {
        StaticSecret::from(*self.secret)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"..")
            .finish()
    }
}

mod b64_array {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = STANDARD.decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_round_trips_through_serde() {
        let mut rng = rand::thread_rng();
        let pair = KeyPair::generate(&mut rng);
        let json = serde_json::to_string(&pair.public()).unwrap();
        let back: Public = serde_json::from_str(&json).unwrap();
        assert_eq!(pair.public(), back);
    }
}

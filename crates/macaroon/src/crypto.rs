//! The HMAC signature chain and the Curve25519 sealed-box construction used
//! to hide a third-party caveat's root key from everyone but the discharger
//! holding the matching private key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::MacaroonError;

type HmacSha256 = Hmac<Sha256>;

const KEY_GENERATOR: &[u8] = b"macaroons-key-generator";
const NONCE_LEN: usize = 24;

/// Derive the 32-byte macaroon signing key from an arbitrary-length root key,
/// mirroring the classical `generate_derived_key` step.
pub fn derive_key(root_key: &[u8]) -> [u8; 32] {
    hmac256(KEY_GENERATOR, root_key)
}

/// `signature = HMAC(key, data)`, truncated to 32 bytes (SHA-256's native width).
pub fn hmac256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Fold a first-party caveat predicate into the running signature.
pub fn sign_first_party(signature: &[u8; 32], predicate: &[u8]) -> [u8; 32] {
    hmac256(signature, predicate)
}

/// Fold a third-party caveat (its id and verification id) into the running
/// signature: `HMAC(sig, HMAC(sig, vid) || id)`.
pub fn sign_third_party(signature: &[u8; 32], verification_id: &[u8], caveat_id: &[u8]) -> [u8; 32] {
    let left = hmac256(signature, verification_id);
    let mut data = Vec::with_capacity(left.len() + caveat_id.len());
    data.extend_from_slice(&left);
    data.extend_from_slice(caveat_id);
    hmac256(signature, &data)
}

/// Bind a discharge macaroon's signature to its root's, so the discharge only
/// verifies alongside this exact root: `HMAC(0, root_sig || discharge_sig)`.
pub fn bind_signature(root_signature: &[u8; 32], discharge_signature: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(root_signature);
    data.extend_from_slice(discharge_signature);
    hmac256(&[0u8; 32], &data)
}

/// Seal a third-party caveat's root key to `recipient`'s public key, Curve25519
/// ECDH plus ChaCha20-Poly1305 AEAD, the modern equivalent of the classical
/// NaCl `secretbox` construction used by the reference implementation.
///
/// The returned `verification_id` is `ephemeral_public || nonce || ciphertext`.
pub fn seal(
    rng: &mut (impl RngCore + CryptoRng),
    recipient: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, MacaroonError> {
    let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes()).map_err(|_| MacaroonError::Seal)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes[..12]);
    let nonce = Nonce::from_slice(&nonce_bytes[..12]);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: ephemeral_public.as_bytes(),
            },
        )
        .map_err(|_| MacaroonError::Seal)?;

    let mut out = Vec::with_capacity(32 + 12 + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes[..12]);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a verification id sealed by [`seal`] using the discharger's private key.
pub fn open(private_key: &StaticSecret, verification_id: &[u8]) -> Result<Vec<u8>, MacaroonError> {
    if verification_id.len() < 32 + 12 {
        return Err(MacaroonError::MalformedVerificationId);
    }
    let (ephemeral_public_bytes, rest) = verification_id.split_at(32);
    let (nonce_bytes, ciphertext) = rest.split_at(12);

    let ephemeral_public: [u8; 32] = ephemeral_public_bytes
        .try_into()
        .map_err(|_| MacaroonError::MalformedVerificationId)?;
    let ephemeral_public = PublicKey::from(ephemeral_public);

    let shared = private_key.diffie_hellman(&ephemeral_public);
    let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes()).map_err(|_| MacaroonError::Open)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: ephemeral_public_bytes,
            },
        )
        .map_err(|_| MacaroonError::Open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn seal_open_round_trip() {
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(42);
        let recipient_secret = StaticSecret::random_from_rng(&mut rng);
        let recipient_public = PublicKey::from(&recipient_secret);

        let sealed = seal(&mut rng, &recipient_public, b"a root key").unwrap();
        let opened = open(&recipient_secret, &sealed).unwrap();
        assert_eq!(opened, b"a root key");
    }

    #[test]
    fn open_rejects_truncated_payload() {
        let secret = StaticSecret::from([7u8; 32]);
        assert!(open(&secret, &[0u8; 4]).is_err());
    }

    #[test]
    fn derive_key_is_deterministic() {
        assert_eq!(derive_key(b"k"), derive_key(b"k"));
        assert_ne!(derive_key(b"k1"), derive_key(b"k2"));
    }
}

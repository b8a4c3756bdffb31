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

//! Recovering a third-party caveat's root key outside the request that
//! minted it.
//!
//! A third-party caveat's root key is sealed to the discharger's public key
//! (`bakery-macaroon::crypto::seal`), so the oven that minted the macaroon
//! cannot decrypt its own ciphertext back out of a macaroon it receives on
//! a later, unrelated request. [`RootKeyStore`] is how it gets the key back
//! anyway: either by remembering it, or by deriving it deterministically
//! from the caveat id it chose at mint time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// Mints and recovers root keys for third-party caveats an oven creates.
pub trait RootKeyStore: Send + Sync {
    /// Choose a root key for a freshly minted caveat with this id.
    fn new_key(&self, caveat_id: &[u8]) -> Vec<u8>;

    /// Recover the root key previously returned by [`Self::new_key`] for
    /// this caveat id, or `None` if it is unknown to this store.
    fn get(&self, caveat_id: &[u8]) -> Option<Vec<u8>>;
}

/// Derives `HMAC(secret, caveat_id)` as the root key, so any process
/// holding `secret` reproduces the same key for the same caveat id without
/// keeping per-macaroon state. The default store for production use.
pub struct DerivedRootKeyStore {
    secret: Vec<u8>,
}

impl DerivedRootKeyStore {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn derive(&self, caveat_id: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(caveat_id);
        mac.finalize().into_bytes().to_vec()
    }
}

impl RootKeyStore for DerivedRootKeyStore {
    fn new_key(&self, caveat_id: &[u8]) -> Vec<u8> {
        self.derive(caveat_id)
    }

    fn get(&self, caveat_id: &[u8]) -> Option<Vec<u8>> {
        Some(self.derive(caveat_id))
    }
}

/// Remembers root keys in an in-memory map. Useful for tests, or for a
/// deployment that prefers random per-caveat keys over a derivable scheme.
#[derive(Default)]
pub struct InMemoryRootKeyStore {
    keys: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryRootKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RootKeyStore for InMemoryRootKeyStore {
    fn new_key(&self, caveat_id: &[u8]) -> Vec<u8> {
        use rand::RngCore;
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        self.keys
            .lock()
            .expect("root key store mutex poisoned")
            .insert(caveat_id.to_vec(), key.clone());
        key
    }

    fn get(&self, caveat_id: &[u8]) -> Option<Vec<u8>> {
        self.keys.lock().expect("root key store mutex poisoned").get(caveat_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_store_is_deterministic_across_instances() {
        let a = DerivedRootKeyStore::new("shared secret");
        let b = DerivedRootKeyStore::new("shared secret");
        let key_id = b"caveat-1";
        assert_eq!(a.new_key(key_id), b.get(key_id).unwrap());
    }

    #[test]
    fn derived_store_differs_per_caveat() {
        let store = DerivedRootKeyStore::new("shared secret");
        assert_ne!(store.new_key(b"a"), store.new_key(b"b"));
    }

    #[test]
    fn in_memory_store_roundtrips_and_forgets_unknown_ids() {
        let store = InMemoryRootKeyStore::new();
        let key = store.new_key(b"cav-1");
        assert_eq!(store.get(b"cav-1"), Some(key));
        assert_eq!(store.get(b"cav-2"), None);
    }
}

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

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::str_to_string, rustdoc::broken_intra_doc_links)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

//! Discovering and caching a discharger's public key and protocol version
//! (C3).
//!
//! A [`ThirdPartyLocator`] turns a discharger *location* (as named in a
//! macaroon's third-party caveat) into the [`ThirdPartyInfo`] the mint side
//! needs to seal a root key to that discharger. The default implementation
//! enforces HTTPS, caches hits for the lifetime of the process, and falls
//! back from the modern `/discharge/info` endpoint to the legacy
//! `/publickey` one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bakery_core::{BakeryVersion, ThirdPartyInfo};
use bakery_macaroon::Public;
use bakery_http::HttpClient;
use http::Uri;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("location {0:?} is not HTTPS and AllowInsecure was not set")]
    Insecure(String),

    #[error("location {0:?} is not a valid URL")]
    InvalidLocation(String),

    #[error(transparent)]
    Http(#[from] bakery_http::HttpClientError),
}

#[derive(Debug, Deserialize)]
struct DischargeInfoResponse {
    #[serde(rename = "PublicKey")]
    public_key: Public,
    #[serde(rename = "Version")]
    version: u8,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "PublicKey")]
    public_key: Public,
}

/// Resolves a discharger location to its public key and protocol version.
#[async_trait]
pub trait ThirdPartyLocator: Send + Sync {
    async fn third_party_info(&self, location: &str) -> Result<ThirdPartyInfo, LocatorError>;
}

/// The default locator: HTTPS-only unless `allow_insecure` is set, backed
/// by an in-memory cache that never expires within the process (a
/// discharger's key is not expected to rotate under a live deployment
/// without an operator seeding the new one).
pub struct DefaultLocator {
    http: HttpClient,
    cache: Mutex<HashMap<String, ThirdPartyInfo>>,
    allow_insecure: bool,
}

impl DefaultLocator {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            cache: Mutex::new(HashMap::new()),
            allow_insecure: false,
        }
    }

    #[must_use]
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Seed a known discharger's info ahead of time. Prepopulated entries
    /// bypass the HTTPS scheme check, so operators can point at known
    /// loopback/test endpoints without globally disabling it.
    pub fn prepopulate(&self, location: impl Into<String>, info: ThirdPartyInfo) {
        self.cache
            .lock()
            .expect("locator cache mutex poisoned")
            .insert(location.into(), info);
    }

    fn check_scheme(&self, location: &str) -> Result<(), LocatorError> {
        let uri: Uri = location.parse().map_err(|_| LocatorError::InvalidLocation(location.to_owned()))?;
        match uri.scheme_str() {
            Some("https") => Ok(()),
            _ if self.allow_insecure => Ok(()),
            _ => Err(LocatorError::Insecure(location.to_owned())),
        }
    }
}

#[async_trait]
impl ThirdPartyLocator for DefaultLocator {
    #[tracing::instrument(skip(self), fields(location))]
    async fn third_party_info(&self, location: &str) -> Result<ThirdPartyInfo, LocatorError> {
        if let Some(info) = self.cache.lock().expect("locator cache mutex poisoned").get(location) {
            return Ok(*info);
        }

        self.check_scheme(location)?;

        let base = location.trim_end_matches('/');
        let discharge_info_url: Uri = format!("{base}/discharge/info")
            .parse()
            .map_err(|_| LocatorError::InvalidLocation(location.to_owned()))?;

        let info = match self.http.get_json::<DischargeInfoResponse>(discharge_info_url).await {
            Ok(resp) => ThirdPartyInfo {
                public_key: resp.public_key,
                version: BakeryVersion(resp.version),
            },
            Err(first_err) => {
                // `/discharge/info` is the modern endpoint; a 404 or any
                // other failure against it falls back to the legacy
                // publickey-only one before giving up.
                tracing::debug!(location, error = %first_err, "discharge/info unavailable, falling back to publickey");
                let public_key_url: Uri = format!("{base}/publickey")
                    .parse()
                    .map_err(|_| LocatorError::InvalidLocation(location.to_owned()))?;
                let resp: PublicKeyResponse = self.http.get_json(public_key_url).await.map_err(|_| first_err)?;
                ThirdPartyInfo {
                    public_key: resp.public_key,
                    version: BakeryVersion::LATEST,
                }
            }
        };

        self.cache
            .lock()
            .expect("locator cache mutex poisoned")
            .insert(location.to_owned(), info);

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_info() -> ThirdPartyInfo {
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(1);
        let key = bakery_macaroon::KeyPair::generate(&mut rng);
        ThirdPartyInfo {
            public_key: key.public(),
            version: BakeryVersion::LATEST,
        }
    }

    #[tokio::test]
    async fn prepopulated_entry_bypasses_scheme_check() {
        let locator = DefaultLocator::new(HttpClient::new());
        locator.prepopulate("http://discharger.test", sample_info());

        let info = locator.third_party_info("http://discharger.test").await.unwrap();
        assert_eq!(info.public_key, sample_info().public_key);
    }

    #[tokio::test]
    async fn insecure_location_rejected_without_allow_insecure() {
        let locator = DefaultLocator::new(HttpClient::new());
        let err = locator.third_party_info("http://not-seeded.test").await.unwrap_err();
        assert!(matches!(err, LocatorError::Insecure(_)));
    }

    #[tokio::test]
    async fn allow_insecure_permits_http_fetch_attempt() {
        // Without a running server this still fails, but it must fail at the
        // network layer, not at the scheme check.
        let locator = DefaultLocator::new(HttpClient::new()).allow_insecure(true);
        let err = locator.third_party_info("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, LocatorError::Http(_)));
    }
}

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

//! The discharge client (C4): turns a single third-party caveat into a
//! discharge macaroon, either by asking a remote discharger or, for
//! caveats addressed to `location == "local"`, by discharging in-process
//! with a key the client already holds (the same pattern
//! `bakery-interactors::agent` uses for its local caveats).

use std::collections::VecDeque;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bakery_core::{DischargeToken, ErrorCode};
use bakery_http::{HttpClient, HttpClientError};
use bakery_interactors::InteractorRegistry;
use bakery_macaroon::{KeyPair, Macaroon};
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

const LOCAL: &str = "local";

#[derive(Serialize)]
struct DischargeForm {
    id64: String,
    caveat64: String,
    #[serde(rename = "token-kind", skip_serializing_if = "Option::is_none")]
    token_kind: Option<String>,
    #[serde(rename = "token64", skip_serializing_if = "Option::is_none")]
    token64: Option<String>,
}

#[derive(Deserialize)]
struct MacaroonResponse {
    #[serde(rename = "Macaroon")]
    macaroon: Macaroon,
}

/// Discharges a single caveat, and walks a whole macaroon's third-party
/// caveats (and whatever further caveats those discharges carry) to
/// completion.
pub struct DischargeClient {
    http: HttpClient,
    interactors: InteractorRegistry,
    local_key: Option<KeyPair>,
}

impl DischargeClient {
    #[must_use]
    pub fn new(http: HttpClient, interactors: InteractorRegistry) -> Self {
        Self {
            http,
            interactors,
            local_key: None,
        }
    }

    /// Register a private key for discharging `location == "local"`
    /// caveats in-process, without a round trip.
    #[must_use]
    pub fn with_local_key(mut self, key: KeyPair) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Discharge every third-party caveat on `primary`, breadth-first:
    /// caveats a discharge itself carries are queued and discharged in the
    /// same walk. Returns the discharges unbound; the caller binds them to
    /// the root macaroon's signature.
    #[tracing::instrument(skip(self, primary))]
    pub async fn discharge_all(&self, primary: &Macaroon) -> Result<Vec<Macaroon>, DriverError> {
        let mut discharges = Vec::new();
        let mut queue: VecDeque<(String, Vec<u8>, Vec<u8>)> = primary
            .caveats()
            .iter()
            .filter_map(|c| c.as_third_party())
            .map(|(location, caveat_id, verification_id)| (location.to_owned(), caveat_id.to_vec(), verification_id.to_vec()))
            .collect();

        while let Some((location, caveat_id, verification_id)) = queue.pop_front() {
            let discharge = if location == LOCAL {
                self.discharge_locally(&verification_id, &caveat_id)?
            } else {
                self.discharge_remote(&location, &verification_id, &caveat_id).await?
            };

            for caveat in discharge.caveats() {
                if let Some((loc, cid, vid)) = caveat.as_third_party() {
                    queue.push_back((loc.to_owned(), cid.to_vec(), vid.to_vec()));
                }
            }

            discharges.push(discharge);
        }

        Ok(discharges)
    }

    fn discharge_locally(&self, verification_id: &[u8], caveat_id: &[u8]) -> Result<Macaroon, DriverError> {
        let key = self.local_key.as_ref().ok_or(DriverError::Discharge(
            "caveat addressed to the local discharger but no local key was configured".to_owned(),
        ))?;
        let root_key = Macaroon::open_third_party_root_key(key, verification_id)?;
        Ok(Macaroon::new(&root_key, caveat_id.to_vec(), None))
    }

    /// Discharge one caveat against a remote discharger, resolving any
    /// `interaction-required` response through the interactor registry and
    /// retrying once with the resulting token.
    #[tracing::instrument(skip(self, verification_id, caveat_id))]
    async fn discharge_remote(&self, location: &str, verification_id: &[u8], caveat_id: &[u8]) -> Result<Macaroon, DriverError> {
        let mut token: Option<DischargeToken> = None;

        loop {
            match self.try_discharge(location, verification_id, caveat_id, token.as_ref()).await {
                Ok(macaroon) => return Ok(macaroon),
                Err(DriverError::Http(HttpClientError::Protocol(err))) if err.code == ErrorCode::InteractionRequired => {
                    let resolved = self.interactors.resolve(&self.http, location, &err).await?;
                    token = Some(resolved);
                }
                Err(DriverError::Http(HttpClientError::Protocol(err))) => return Err(DriverError::Discharge(err.message)),
                Err(other) => return Err(other),
            }
        }
    }

    async fn try_discharge(
        &self,
        location: &str,
        verification_id: &[u8],
        caveat_id: &[u8],
        token: Option<&DischargeToken>,
    ) -> Result<Macaroon, DriverError> {
        let base = location.trim_end_matches('/');
        let url: Uri = format!("{base}/discharge").parse().map_err(|_| DriverError::InvalidLocation(location.to_owned()))?;

        let form = DischargeForm {
            id64: URL_SAFE_NO_PAD.encode(verification_id),
            caveat64: URL_SAFE_NO_PAD.encode(caveat_id),
            token_kind: token.map(|t| t.kind.clone()),
            token64: token.map(|t| URL_SAFE_NO_PAD.encode(&t.value)),
        };

        let response: MacaroonResponse = self.http.post_form_json(url, &form).await?;
        Ok(response.macaroon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand_chacha::ChaCha20Rng {
        rand_chacha::ChaCha20Rng::seed_from_u64(11)
    }

    #[test]
    fn discharge_locally_recovers_root_key_and_discharges() {
        let mut r = rng();
        let client_key = KeyPair::generate(&mut r);

        let mut root = Macaroon::new(b"target secret", "root-id", None);
        root.add_third_party_caveat(&mut r, LOCAL, b"local secret", &client_key.public(), "local-cav")
            .unwrap();
        let (_, caveat_id, verification_id) = root.caveats()[0].as_third_party().unwrap();

        let discharge_client = DischargeClient::new(HttpClient::new(), InteractorRegistry::new(vec![])).with_local_key(client_key);
        let discharge = discharge_client.discharge_locally(verification_id, caveat_id).unwrap();
        assert_eq!(discharge.identifier(), caveat_id);
    }

    #[test]
    fn discharge_locally_without_key_is_an_error() {
        let discharge_client = DischargeClient::new(HttpClient::new(), InteractorRegistry::new(vec![]));
        let err = discharge_client.discharge_locally(b"vid", b"cid").unwrap_err();
        assert!(matches!(err, DriverError::Discharge(_)));
    }
}

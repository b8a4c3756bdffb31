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

//! The `agent` interactor: non-interactive discharge for service accounts
//! that hold a private key known in advance to the discharger.
//!
//! Legacy note: an older cookie-based variant of this protocol sets a
//! cookie named `agent-login` whose value is the base64-encoded JSON body
//! `{username, public_key}`, and the discharger responds with
//! `{agent_login: true}` or a standard error body. This crate does not
//! implement that variant; new deployments use the token flow below.

use std::collections::HashMap;
use std::path::Path;

use bakery_core::{DischargeToken, Error as ProtocolError};
use bakery_http::HttpClient;
use bakery_macaroon::{KeyPair, Macaroon, Public};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::InteractError;
use crate::Interactor;

pub const KIND: &str = "agent";

/// One discharger this agent is known to, addressed by the URL prefix it
/// logs in under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub url: String,
    pub username: String,
}

/// The on-disk/environment shape of an agent's credentials: one private
/// key shared across every discharger it is registered with, plus the
/// per-discharger username to present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    key: AgentKey,
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentKey {
    public: Public,
    #[serde(with = "secret_b64")]
    private: [u8; 32],
}

mod secret_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = STANDARD.decode(s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

impl AgentConfig {
    #[must_use]
    pub fn new(key: KeyPair, agents: Vec<AgentEntry>) -> Self {
        Self {
            key: AgentKey {
                public: key.public(),
                private: key.secret_bytes(),
            },
            agents,
        }
    }

    #[must_use]
    pub fn keypair(&self) -> KeyPair {
        KeyPair::from_secret_bytes(self.key.private)
    }

    /// Load from the file named by the `BAKERY_AGENT_FILE` environment
    /// variable.
    pub fn from_env() -> Result<Self, InteractError> {
        Self::from_env_var("BAKERY_AGENT_FILE")
    }

    pub fn from_env_var(var: &str) -> Result<Self, InteractError> {
        let path = std::env::var(var).map_err(|_| {
            InteractError::NoAuthInfo(var.to_owned(), std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        Self::from_file(path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InteractError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| InteractError::NoAuthInfo(path.display().to_string(), e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// The entry matching `location` by longest URL-prefix match, with
    /// trailing-slash normalization on both sides.
    #[must_use]
    pub fn entry_for(&self, location: &str) -> Option<&AgentEntry> {
        let location = location.trim_end_matches('/');
        self.agents
            .iter()
            .filter(|e| {
                let prefix = e.url.trim_end_matches('/');
                location == prefix || location.starts_with(&format!("{prefix}/"))
            })
            .max_by_key(|e| e.url.len())
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "Macaroon")]
    macaroon: Macaroon,
}

/// Non-interactive discharge for a service account whose key the
/// discharger already recognizes.
pub struct AgentInteractor {
    config: AgentConfig,
}

impl AgentInteractor {
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Interactor for AgentInteractor {
    fn kind(&self) -> &str {
        KIND
    }

    async fn interact(
        &self,
        http: &HttpClient,
        location: &str,
        error: &ProtocolError,
    ) -> Result<DischargeToken, InteractError> {
        let entry = self
            .config
            .entry_for(location)
            .ok_or_else(|| InteractError::NoAgentEntry(location.to_owned()))?;

        #[derive(Deserialize)]
        struct AgentParams {
            #[serde(rename = "loginURL")]
            login_url: String,
        }
        let params: AgentParams = error
            .info
            .interaction_method(KIND)
            .map_err(|e| InteractError::BadParams(KIND.to_owned(), e))?
            .ok_or_else(|| InteractError::MissingParams(KIND.to_owned()))?;

        let keypair = self.config.keypair();
        let public_b64 = URL_SAFE_NO_PAD.encode(keypair.public().0);

        let mut query = HashMap::new();
        query.insert("username", entry.username.clone());
        query.insert("public-key", public_b64);
        let qs = bakery_http::query_string(&query);

        let uri: Uri = format!("{login_url}?{qs}", login_url = params.login_url)
            .parse()
            .map_err(|_| InteractError::InvalidLocation(params.login_url.clone()))?;

        let resp: LoginResponse = http.get_json(uri).await?;
        let macaroon = resp.macaroon;

        let mut discharges = Vec::new();
        for caveat in macaroon.caveats() {
            let Some((caveat_location, caveat_id, verification_id)) = caveat.as_third_party() else {
                continue;
            };
            if caveat_location != "local" {
                continue;
            }
            let root_key = Macaroon::open_third_party_root_key(&keypair, verification_id)
                .map_err(|_| InteractError::NoLocalCaveat)?;
            let mut discharge = Macaroon::new(&root_key, caveat_id.to_vec(), None);
            macaroon.bind_for_request(&mut discharge);
            discharges.push(discharge);
        }

        if discharges.is_empty() {
            return Err(InteractError::NoLocalCaveat);
        }

        let mut slice = vec![macaroon];
        slice.extend(discharges);
        let value = serde_json::to_vec(&slice).expect("macaroon slice always serializes");

        Ok(DischargeToken {
            kind: KIND.to_owned(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand_chacha::ChaCha20Rng {
        rand_chacha::ChaCha20Rng::seed_from_u64(42)
    }

    #[test]
    fn entry_for_picks_longest_matching_prefix() {
        let config = AgentConfig::new(
            KeyPair::generate(&mut rng()),
            vec![
                AgentEntry {
                    url: "https://idp.example".to_owned(),
                    username: "generic".to_owned(),
                },
                AgentEntry {
                    url: "https://idp.example/team-a".to_owned(),
                    username: "team-a-bot".to_owned(),
                },
            ],
        );

        let entry = config.entry_for("https://idp.example/team-a/discharge").unwrap();
        assert_eq!(entry.username, "team-a-bot");

        let fallback = config.entry_for("https://idp.example/team-b").unwrap();
        assert_eq!(fallback.username, "generic");
    }

    #[test]
    fn entry_for_returns_none_when_unregistered() {
        let config = AgentConfig::new(KeyPair::generate(&mut rng()), vec![]);
        assert!(config.entry_for("https://unknown.example").is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AgentConfig::new(
            KeyPair::generate(&mut rng()),
            vec![AgentEntry {
                url: "https://idp.example".to_owned(),
                username: "bot".to_owned(),
            }],
        );
        let json = serde_json::to_vec(&config).unwrap();
        let back: AgentConfig = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.keypair().public(), config.keypair().public());
        assert_eq!(back.agents.len(), 1);
    }
}

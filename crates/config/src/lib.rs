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

//! Layered configuration: compiled-in defaults, overridden by an optional
//! YAML file, overridden by `BAKERY_`-prefixed environment variables. Every
//! config type here is a plain serde struct with a [`Default`] impl giving
//! the defaults stated by the rest of this workspace (retry bound,
//! rendezvous timeout, authn/authz expiry, TLS policy).

use camino::Utf8Path;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Load `T` from its compiled-in [`Default`], a YAML file (if `path` is
/// `Some` and exists), and `BAKERY_`-prefixed environment variables, in
/// that order of increasing precedence.
pub fn load<T>(path: Option<&Utf8Path>) -> Result<T, ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed("BAKERY_").split("__"));
    Ok(figment.extract()?)
}

/// What a discharger service binds to, advertises as its own location, and
/// bounds its interactive sessions by.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DischargerConfig {
    pub listen_addr: String,
    pub location: String,
    pub interaction_kinds: Vec<String>,
    pub wait_timeout_secs: u64,
}

impl Default for DischargerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
            location: "http://127.0.0.1:8080".to_owned(),
            interaction_kinds: Vec::new(),
            wait_timeout_secs: 60,
        }
    }
}

/// What a client-side driver needs: where to find its agent credentials,
/// whether to relax the locator's HTTPS-only policy, and the discharge
/// retry bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub agent_file: Option<String>,
    pub allow_insecure_locations: bool,
    pub max_discharge_retries: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_file: None,
            allow_insecure_locations: false,
            max_discharge_retries: 3,
        }
    }
}

/// What a target service binds to, advertises, and mints macaroons with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub listen_addr: String,
    pub location: String,
    pub root_key_secret: String,
    pub authz_expiry_secs: i64,
    pub authn_expiry_secs: i64,
    pub discharger_location: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9090".to_owned(),
            location: "http://127.0.0.1:9090".to_owned(),
            root_key_secret: String::new(),
            authz_expiry_secs: 5 * 60,
            authn_expiry_secs: 24 * 60 * 60,
            discharger_location: "http://127.0.0.1:8080".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn discharger_config_defaults_with_no_file_or_env() {
        let config: DischargerConfig = load(None).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.wait_timeout_secs, 60);
    }

    #[test]
    fn env_override_wins_over_default() {
        Jail::expect_with(|jail| {
            jail.set_env("BAKERY_WAIT_TIMEOUT_SECS", "120");
            let config: DischargerConfig = load(None).unwrap();
            assert_eq!(config.wait_timeout_secs, 120);
            Ok(())
        });
    }

    #[test]
    fn yaml_file_overrides_default_and_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("target.yaml", "root_key_secret: from-file\nauthz_expiry_secs: 30\n")?;
            jail.set_env("BAKERY_AUTHZ_EXPIRY_SECS", "45");

            let path = Utf8Path::new("target.yaml");
            let config: TargetConfig = load(Some(path)).unwrap();
            assert_eq!(config.root_key_secret, "from-file");
            assert_eq!(config.authz_expiry_secs, 45);
            Ok(())
        });
    }
}

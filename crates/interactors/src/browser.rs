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

//! The `browser-window` (legacy: `browser`) interactor: opens a visit URL
//! in an external program, or prints it when nothing suitable is
//! available, and then polls/waits on the discharger's wait endpoint for
//! completion. This crate only implements the open-the-URL half; the
//! wait-loop is the discharge driver's job once it has a wait URL.

use std::process::Command;

use bakery_core::{DischargeToken, Error as ProtocolError};
use bakery_http::HttpClient;
use serde::Deserialize;

use crate::error::InteractError;
use crate::Interactor;

pub const KIND: &str = "browser-window";

/// Opens a URL the way a human at a terminal would expect, dispatching on
/// the host OS. Falls back to printing the URL when no opener is known.
pub fn open(url: &str) -> std::io::Result<()> {
    let status = if cfg!(target_os = "linux") {
        Command::new("sensible-browser").arg(url).status()
    } else if cfg!(target_os = "macos") {
        Command::new("open").arg(url).status()
    } else if cfg!(target_os = "freebsd") || cfg!(target_os = "openbsd") || cfg!(target_os = "netbsd") {
        Command::new("xdg-open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").arg("/c").arg("start").arg(escape_windows(url)).status()
    } else {
        println!("{url}");
        return Ok(());
    };

    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => {
            println!("{url}");
            Err(std::io::Error::new(std::io::ErrorKind::Other, format!("browser opener exited with {s}")))
        }
        Err(e) => {
            println!("{url}");
            Err(e)
        }
    }
}

/// Escapes `& % ( ) ^ < > |` for `cmd /c start`, each prefixed with `^`.
fn escape_windows(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        if matches!(c, '&' | '%' | '(' | ')' | '^' | '<' | '>' | '|') {
            escaped.push('^');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Deserialize)]
struct VisitParams {
    #[serde(rename = "VisitURL")]
    visit_url: String,
    #[serde(rename = "WaitURL")]
    wait_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: DischargeToken,
}

/// Opens the discharger's visit URL in a browser, then polls its wait URL
/// until the out-of-band interaction completes.
pub struct BrowserInteractor {
    poll_interval: std::time::Duration,
}

impl Default for BrowserInteractor {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_millis(500),
        }
    }
}

impl BrowserInteractor {
    #[must_use]
    pub fn with_poll_interval(poll_interval: std::time::Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait::async_trait]
impl Interactor for BrowserInteractor {
    fn kind(&self) -> &str {
        KIND
    }

    async fn interact(
        &self,
        http: &HttpClient,
        _location: &str,
        error: &ProtocolError,
    ) -> Result<DischargeToken, InteractError> {
        let params: VisitParams = error
            .info
            .interaction_method(KIND)
            .map_err(|e| InteractError::BadParams(KIND.to_owned(), e))?
            .ok_or_else(|| InteractError::MissingParams(KIND.to_owned()))?;

        open(&params.visit_url).ok();

        self.wait(http, &params.wait_url).await
    }

    async fn legacy_interact(
        &self,
        http: &HttpClient,
        visit_url: &str,
        wait_url: &str,
    ) -> Result<DischargeToken, InteractError> {
        open(visit_url).ok();
        self.wait(http, wait_url).await
    }
}

impl BrowserInteractor {
    async fn wait(&self, http: &HttpClient, wait_url: &str) -> Result<DischargeToken, InteractError> {
        let wait_uri = wait_url.parse().map_err(|_| InteractError::InvalidLocation(wait_url.to_owned()))?;

        loop {
            match http.get_json::<TokenResponse>(wait_uri.clone()).await {
                Ok(resp) => return Ok(resp.token),
                Err(bakery_http::HttpClientError::Protocol(e))
                    if e.code == bakery_core::ErrorCode::InteractionRequired =>
                {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_windows_prefixes_special_chars() {
        assert_eq!(escape_windows("a&b"), "a^&b");
        assert_eq!(escape_windows("plain"), "plain");
        assert_eq!(escape_windows("(x)"), "^(x^)");
    }
}

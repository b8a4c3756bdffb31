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

use bakery_interactors::InteractError;
use thiserror::Error;

/// Failure modes of a discharge walk or a driven request, distinguishable
/// by the caller the way the protocol requires: a discharger's own refusal
/// reads differently than a network error or an exhausted interactor.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Http(#[from] bakery_http::HttpClientError),

    #[error("discharge refused: {0}")]
    Discharge(String),

    #[error("interaction failed: {0}")]
    Interaction(#[from] InteractError),

    #[error(transparent)]
    Macaroon(#[from] bakery_macaroon::MacaroonError),

    #[error(transparent)]
    Cookie(#[from] bakery_core::cookie::CookieError),

    #[error("request URL {0:?} is not valid")]
    InvalidLocation(String),

    #[error("discharge-required error carried no macaroon")]
    MissingMacaroon,

    #[error("gave up after {0} discharge retries")]
    TooManyRetries(usize),

    #[error("response body was not a recognizable protocol error")]
    MalformedError(#[source] serde_json::Error),
}

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

use thiserror::Error;

/// Why an interactor failed to turn an `interaction-required` error into a
/// discharge token.
#[derive(Debug, Error)]
pub enum InteractError {
    #[error(transparent)]
    Http(#[from] bakery_http::HttpClientError),

    #[error("interaction method {0:?} carried no usable parameters")]
    MissingParams(String),

    #[error("interaction method {0:?} parameters did not parse: {1}")]
    BadParams(String, serde_json::Error),

    #[error("no agent entry configured for discharger location {0:?}")]
    NoAgentEntry(String),

    #[error("no environment variable named {0:?} pointed at an agent auth file, or the file could not be read: {1}")]
    NoAuthInfo(String, std::io::Error),

    #[error("agent auth file was not valid JSON: {0}")]
    BadAuthFile(#[from] serde_json::Error),

    #[error("response did not carry the expected third-party caveat addressed to this agent's key")]
    NoLocalCaveat,

    #[error("could not read field {0:?} as a {1}")]
    FieldCoercion(String, &'static str),

    #[error("user declined to provide a value for required field {0:?}")]
    FieldRequired(String),

    #[error("failed reading from the terminal: {0}")]
    Io(#[from] std::io::Error),

    #[error("no interactor's kind matched any method in interactionMethods, and no legacy visit/wait URL was present")]
    MethodNotFound,

    #[error("this interactor does not support the legacy visit/wait protocol")]
    LegacyNotSupported,

    #[error("location {0:?} is not a valid URL")]
    InvalidLocation(String),
}

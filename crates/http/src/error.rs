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

/// Errors raised by [`crate::client::HttpClient`] before protocol-level
/// interpretation. A non-2xx JSON response is *not* one of these: it
/// unmarshals into [`bakery_core::Error`] and is returned as
/// [`HttpClientError::Protocol`], which callers switch on by
/// [`bakery_core::ErrorCode`].
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("failed to build request")]
    Build(#[from] http::Error),

    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    #[error("could not read response body")]
    Body(#[source] hyper::Error),

    #[error("unexpected content type {content_type:?}, expected JSON")]
    UnexpectedContentType { content_type: String },

    #[error("could not decode response body as JSON")]
    Json(#[from] serde_json::Error),

    #[error("could not encode request body as form-urlencoded")]
    Form(#[from] serde_urlencoded::ser::Error),

    /// A non-2xx response whose JSON body decoded into the wire error
    /// taxonomy (`bad-request`, `discharge-required`, ...).
    #[error(transparent)]
    Protocol(#[from] bakery_core::Error),
}

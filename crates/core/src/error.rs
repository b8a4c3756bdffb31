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

use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use bakery_macaroon::Macaroon;
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};

use crate::version::BakeryVersion;

/// The wire error taxonomy that drives the discharge protocol: every
/// non-2xx response from a target or discharger is one of these, and its
/// `code` is what a client's discharge driver switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    BadRequest,
    DischargeRequired,
    InteractionRequired,
    InteractionMethodNotFound,
}

impl ErrorCode {
    /// The HTTP status this code maps to at the given protocol version.
    #[must_use]
    pub fn status(self, version: BakeryVersion) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::DischargeRequired | Self::InteractionRequired => {
                if version.is_legacy() {
                    StatusCode::from_u16(407).expect("407 is a valid status code")
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }
            Self::InteractionMethodNotFound => StatusCode::BAD_REQUEST,
        }
    }
}

/// The payload accompanying an [`Error`], carrying whatever the client
/// needs to drive the next step of the protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macaroon: Option<Macaroon>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "MacaroonPath")]
    pub macaroon_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_name_suffix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "VisitURL")]
    pub legacy_visit_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "WaitURL")]
    pub legacy_wait_url: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub interaction_methods: HashMap<String, serde_json::Value>,
}

impl ErrorInfo {
    /// Typed access to one interaction method's parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is present but its parameters don't
    /// deserialize into `T`.
    pub fn interaction_method<T: for<'de> Deserialize<'de>>(
        &self,
        kind: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.interaction_methods
            .get(kind)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
    }
}

/// A protocol-level error: JSON on the wire, its HTTP status determined by
/// `code` and the caller's [`BakeryVersion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub info: ErrorInfo,
    #[serde(default)]
    pub version: BakeryVersion,
}

impl Error {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            info: ErrorInfo::default(),
            version: BakeryVersion::default(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    #[must_use]
    pub fn discharge_required(macaroon: Macaroon, version: BakeryVersion) -> Self {
        Self {
            code: ErrorCode::DischargeRequired,
            message: "macaroon discharge required".to_owned(),
            info: ErrorInfo {
                macaroon: Some(macaroon),
                ..ErrorInfo::default()
            },
            version,
        }
    }

    #[must_use]
    pub fn interaction_required(
        message: impl Into<String>,
        interaction_methods: HashMap<String, serde_json::Value>,
        version: BakeryVersion,
    ) -> Self {
        Self {
            code: ErrorCode::InteractionRequired,
            message: message.into(),
            info: ErrorInfo {
                interaction_methods,
                ..ErrorInfo::default()
            },
            version,
        }
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.info.macaroon_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_cookie_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.info.cookie_name_suffix = Some(suffix.into());
        self
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", serde_json::to_string(&self.code).unwrap_or_default(), self.message)
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.code.status(self.version);
        let mut response = (status, axum::Json(&self)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Macaroon"));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discharge_required_status_follows_version() {
        let err = ErrorCode::DischargeRequired;
        assert_eq!(err.status(BakeryVersion::LEGACY).as_u16(), 407);
        assert_eq!(err.status(BakeryVersion::LATEST), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bad_request_is_always_400() {
        assert_eq!(ErrorCode::BadRequest.status(BakeryVersion::LEGACY), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::BadRequest.status(BakeryVersion::LATEST), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn round_trips_through_json() {
        let err = Error::bad_request("nope").with_cookie_path("/foo");
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::BadRequest);
        assert_eq!(back.info.macaroon_path.as_deref(), Some("/foo"));
    }

    #[test]
    fn interaction_method_typed_access() {
        let mut methods = HashMap::new();
        methods.insert("form".to_owned(), serde_json::json!({"url": "https://idp.example/form"}));
        let err = Error::interaction_required("pick a method", methods, BakeryVersion::LATEST);

        #[derive(Deserialize)]
        struct FormParams {
            url: String,
        }

        let params: FormParams = err.info.interaction_method("form").unwrap().unwrap();
        assert_eq!(params.url, "https://idp.example/form");
        assert!(err.info.interaction_method::<FormParams>("agent").unwrap().is_none());
    }
}

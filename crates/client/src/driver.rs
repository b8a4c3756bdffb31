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

//! The discharge driver (C8): the loop a client runs a request through,
//! retrying against discharge-required responses until the request
//! succeeds, fails outright, or exhausts its retry budget.
//!
//! A request body here is a factory rather than a value: `hyper::Body`
//! can't be rewound, so the caller supplies a closure that builds a fresh
//! request for every attempt, playing the role the external protocol gives
//! a seekable body.

use bakery_core::{BakeryVersion, Error as ProtocolError, ErrorCode};
use bakery_http::{HttpClient, HttpClientError};
use http::{header, HeaderValue, StatusCode};
use hyper::{Body, Request, Response};

use crate::client::DischargeClient;
use crate::cookie_jar::CookieJar;
use crate::error::DriverError;

const DEFAULT_MAX_RETRIES: usize = 3;

/// Drives a request against a target through as many discharge rounds as
/// it takes, accumulating the resulting macaroon slice in a cookie jar
/// scoped to each response's advertised cookie path.
pub struct Driver {
    http: HttpClient,
    discharge_client: DischargeClient,
    jar: CookieJar,
    max_retries: usize,
}

impl Driver {
    #[must_use]
    pub fn new(http: HttpClient, discharge_client: DischargeClient) -> Self {
        Self {
            http,
            discharge_client,
            jar: CookieJar::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Run `build_request` (called once per attempt) against the target,
    /// resolving any `discharge-required` response and retrying until
    /// success, a non-discharge error, or `max_retries` is exhausted.
    #[tracing::instrument(skip(self, build_request))]
    pub async fn do_request<F>(&self, mut build_request: F) -> Result<Response<Body>, DriverError>
    where
        F: FnMut() -> Result<Request<Body>, DriverError>,
    {
        for attempt in 0..=self.max_retries {
            let mut request = build_request()?;
            request.headers_mut().insert(
                BakeryVersion::HEADER_NAME,
                HeaderValue::from_static("1"),
            );
            if let Some(cookie_header) = self.jar.header_for_path(request.uri().path()) {
                let value = HeaderValue::from_str(&cookie_header).map_err(|_| DriverError::InvalidLocation(cookie_header.clone()))?;
                request.headers_mut().insert(header::COOKIE, value);
            }

            let response = self.http.send_raw(request).await?;
            let status = response.status();
            if status != StatusCode::UNAUTHORIZED && status.as_u16() != 407 {
                return Ok(response);
            }

            let body = hyper::body::to_bytes(response.into_body()).await.map_err(HttpClientError::Body)?;
            let err: ProtocolError = serde_json::from_slice(&body).map_err(DriverError::MalformedError)?;

            if err.code != ErrorCode::DischargeRequired {
                return Err(DriverError::Discharge(err.message));
            }
            if attempt == self.max_retries {
                return Err(DriverError::TooManyRetries(self.max_retries));
            }

            self.satisfy_discharge(&err).await?;
        }

        unreachable!("loop above always returns before exhausting its attempts")
    }

    async fn satisfy_discharge(&self, err: &ProtocolError) -> Result<(), DriverError> {
        let primary = err.info.macaroon.clone().ok_or(DriverError::MissingMacaroon)?;

        let mut discharges = self.discharge_client.discharge_all(&primary).await?;
        for discharge in &mut discharges {
            primary.bind_for_request(discharge);
        }

        let mut slice = vec![primary];
        slice.extend(discharges);

        let path = err.info.macaroon_path.clone().unwrap_or_else(|| "/".to_owned());
        let cookie = bakery_core::cookie::build_cookie(err.info.cookie_name_suffix.as_deref(), &slice, path)?;
        self.jar.set(cookie);

        Ok(())
    }
}

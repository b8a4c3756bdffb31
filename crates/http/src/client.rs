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

//! A small JSON-speaking HTTP client shared by the third-party locator (C3)
//! and the discharge client (C4). Both talk to dischargers the same way:
//! GET or POST, response either `200 {...}` or a non-2xx [`bakery_core::Error`].

use std::collections::HashMap;
use std::time::Duration;

use http::{header, Method, StatusCode, Uri};
use hyper::{Body, Request};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::HttpClientError;

type Connector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

/// Thin wrapper over a `hyper` client, configured for the discharge
/// protocol's RPC style: short-lived JSON/form requests, no connection
/// pooling tuning beyond what `hyper` does by default, and a request
/// timeout so a wedged discharger can't hang a discharge walk forever.
#[derive(Clone)]
pub struct HttpClient {
    inner: hyper::Client<Connector>,
    timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Build a client honoring the process-wide [`crate::tls::skip_verify`]
    /// flag at construction time. Callers that toggle the flag after
    /// constructing a long-lived client should rebuild it.
    #[must_use]
    pub fn new() -> Self {
        let connector = if crate::tls::skip_verify() {
            Self::insecure_connector()
        } else {
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .build()
        };

        Self {
            inner: hyper::Client::builder().build(connector),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn insecure_connector() -> Connector {
        let mut config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(std::sync::Arc::new(NoVerify))
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build()
    }

    /// `GET url`, decoding a 2xx JSON body as `T` or a non-2xx JSON body as
    /// the wire [`bakery_core::Error`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: Uri) -> Result<T, HttpClientError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())?;
        self.execute(request).await
    }

    /// `POST url` with a form-urlencoded body, decoding the response the
    /// same way as [`Self::get_json`].
    pub async fn post_form_json<T, F>(&self, url: Uri, form: &F) -> Result<T, HttpClientError>
    where
        T: DeserializeOwned,
        F: Serialize,
    {
        let body = serde_urlencoded::to_string(form)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .body(Body::from(body))?;
        self.execute(request).await
    }

    /// `POST url` with a JSON body, decoding the response the same way as
    /// [`Self::get_json`].
    pub async fn post_json<T, B>(&self, url: Uri, body: &B) -> Result<T, HttpClientError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let body = serde_json::to_vec(body)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(Body::from(body))?;
        self.execute(request).await
    }

    /// Send an arbitrary request and return the raw response, with no
    /// assumption about its content type. Used by the discharge driver (C8)
    /// to retry a caller's own request against a target service, which is
    /// not necessarily JSON the way discharger RPCs are.
    pub async fn send_raw(&self, request: Request<Body>) -> Result<hyper::Response<Body>, HttpClientError> {
        match tokio::time::timeout(self.timeout, self.inner.request(request)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(HttpClientError::UnexpectedContentType {
                content_type: "request timed out before a response was received".to_owned(),
            }),
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: Request<Body>) -> Result<T, HttpClientError> {
        let response = self.send_raw(request).await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(HttpClientError::Body)?;

        if !content_type.starts_with("application/json") {
            return Err(HttpClientError::UnexpectedContentType { content_type });
        }

        if status.is_success() {
            Ok(serde_json::from_slice(&body)?)
        } else {
            let err: bakery_core::Error = serde_json::from_slice(&body)?;
            Err(HttpClientError::Protocol(err))
        }
    }
}

#[derive(Debug)]
struct NoVerify;

impl rustls::client::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

/// Build a query string from a flat map, the form the discharge protocol
/// accepts query parameters in (equivalently to a form-encoded body).
#[must_use]
pub fn query_string(params: &HashMap<&str, String>) -> String {
    serde_urlencoded::to_string(params).unwrap_or_default()
}

/// Whether an HTTP status falls in the success range, used by callers that
/// bypass [`HttpClient`] (e.g. an axum test harness exercising a router
/// in-process via `tower::ServiceExt::oneshot`).
#[must_use]
pub fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_encodes_flat_map() {
        let mut params = HashMap::new();
        params.insert("id", "abc def".to_owned());
        assert_eq!(query_string(&params), "id=abc+def");
    }
}

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
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bakery_core::checkers::RequestContext;
use bakery_core::{BakeryVersion, DischargeToken, Error as ProtocolError};
use bakery_macaroon::Macaroon;
use http::HeaderMap;
use serde::Serialize;

use crate::checker::CheckOutcome;
use crate::Discharger;

/// Merge a request's URL query and form-encoded body into a single
/// parameter map, per the wire contract that either carries the discharge
/// request's fields. Body entries win over query entries on collision.
fn params(uri: &axum::http::Uri, body: &[u8]) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = uri
        .query()
        .map(|q| serde_urlencoded::from_str(q).unwrap_or_default())
        .unwrap_or_default();
    if !body.is_empty() {
        if let Ok(from_body) = serde_urlencoded::from_bytes::<HashMap<String, String>>(body) {
            map.extend(from_body);
        }
    }
    map
}

fn version_from_headers(headers: &HeaderMap) -> BakeryVersion {
    BakeryVersion::parse(headers.get(BakeryVersion::HEADER_NAME).and_then(|v| v.to_str().ok()))
}

fn decode_caveat_id(params: &HashMap<String, String>) -> Result<Vec<u8>, ProtocolError> {
    if let Some(id) = params.get("id") {
        return Ok(id.as_bytes().to_vec());
    }
    if let Some(id64) = params.get("id64") {
        return URL_SAFE_NO_PAD
            .decode(id64)
            .map_err(|_| ProtocolError::bad_request("id64 is not valid base64url"));
    }
    Err(ProtocolError::bad_request("missing id or id64 parameter"))
}

fn decode_caveat_body(params: &HashMap<String, String>) -> Result<Vec<u8>, ProtocolError> {
    match params.get("caveat64") {
        Some(c) => URL_SAFE_NO_PAD.decode(c).map_err(|_| ProtocolError::bad_request("caveat64 is not valid base64url")),
        None => Ok(Vec::new()),
    }
}

fn decode_token(params: &HashMap<String, String>) -> Result<Option<DischargeToken>, ProtocolError> {
    match (params.get("token-kind"), params.get("token64")) {
        (Some(kind), Some(value)) => {
            let value = URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|_| ProtocolError::bad_request("token64 is not valid base64url"))?;
            Ok(Some(DischargeToken { kind: kind.clone(), value }))
        }
        (None, None) => Ok(None),
        _ => Err(ProtocolError::bad_request("token-kind and token64 must be supplied together")),
    }
}

#[derive(Serialize)]
struct MacaroonResponse {
    #[serde(rename = "Macaroon")]
    macaroon: Macaroon,
}

/// `POST /discharge`.
pub async fn discharge(
    State(discharger): State<Discharger>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let version = version_from_headers(&headers);
    let params = params(&uri, &body);
    let ctx = RequestContext::new(connect_info.map(|c| c.0.ip()), &headers);

    match discharge_inner(&discharger, &ctx, &params, version).await {
        Ok(macaroon) => Json(MacaroonResponse { macaroon }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn discharge_inner(
    discharger: &Discharger,
    ctx: &RequestContext,
    params: &HashMap<String, String>,
    version: BakeryVersion,
) -> Result<Macaroon, ProtocolError> {
    let verification_id = decode_caveat_id(params)?;
    let caveat_id = decode_caveat_body(params)?;
    let token = decode_token(params)?;

    let info = discharger.open_caveat(&verification_id, &caveat_id)?;

    match discharger.checker().check(ctx, &info, token.as_ref()).await {
        CheckOutcome::Caveats(caveats) => discharger.mint(&info, caveats).map_err(|_| ProtocolError::bad_request("failed to mint discharge macaroon")),
        CheckOutcome::InteractionRequired(methods) => Err(ProtocolError::interaction_required(
            "interaction required to discharge this caveat",
            methods,
            version,
        )),
        CheckOutcome::Error(mut err) => {
            err.version = version;
            Err(err)
        }
    }
}

#[derive(Serialize)]
struct PublicKeyResponse {
    #[serde(rename = "PublicKey")]
    public_key: bakery_macaroon::Public,
}

/// `GET /publickey`.
pub async fn public_key(State(discharger): State<Discharger>) -> Response {
    Json(PublicKeyResponse {
        public_key: discharger.public_key(),
    })
    .into_response()
}

#[derive(Serialize)]
struct DischargeInfoResponse {
    #[serde(rename = "PublicKey")]
    public_key: bakery_macaroon::Public,
    #[serde(rename = "Version")]
    version: u8,
}

/// `GET /discharge/info`.
pub async fn discharge_info(State(discharger): State<Discharger>) -> Response {
    Json(DischargeInfoResponse {
        public_key: discharger.public_key(),
        version: BakeryVersion::LATEST.0,
    })
    .into_response()
}

#[derive(Serialize)]
struct VisitMethods {
    methods: HashMap<String, serde_json::Value>,
}

/// Typed interaction params for `kind`, addressed at this discharger's own
/// `/visit`/`/wait` endpoints for `dischargeid`. Mirrors the field names
/// each interactor's own deserializer expects: `agent`'s `loginURL`
/// (agent.rs), `form`'s `URL` (form.rs), `browser-window`'s `VisitURL`/
/// `WaitURL` (browser.rs).
fn interaction_params(kind: &str, visit_url: &str, wait_url: &str) -> serde_json::Value {
    match kind {
        "agent" => serde_json::json!({"loginURL": visit_url}),
        "form" => serde_json::json!({"URL": visit_url}),
        "browser-window" | "browser" => serde_json::json!({"VisitURL": visit_url, "WaitURL": wait_url}),
        _ => serde_json::json!({}),
    }
}

fn interaction_methods(discharger: &Discharger, dischargeid: &str) -> HashMap<String, serde_json::Value> {
    let base = discharger.location().unwrap_or_default();
    let visit_url = format!("{base}/visit?dischargeid={dischargeid}");
    let wait_url = format!("{base}/wait?dischargeid={dischargeid}");

    discharger
        .interaction_kinds()
        .iter()
        .map(|kind| (kind.clone(), interaction_params(kind, &visit_url, &wait_url)))
        .collect()
}

fn render_visit_page(methods: &HashMap<String, serde_json::Value>) -> Html<String> {
    let items: String = methods
        .keys()
        .map(|kind| format!("<li>{kind}</li>"))
        .collect::<Vec<_>>()
        .join("\n");
    Html(format!(
        "<!doctype html><html><body><p>This request needs interaction via one of:</p><ul>{items}</ul></body></html>"
    ))
}

/// `GET /visit?dischargeid=…`: lists supported interaction methods as JSON
/// for a programmatic caller, or renders a minimal page for a browser.
pub async fn visit_get(State(discharger): State<Discharger>, OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Response {
    let accepts_json = headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    let params = params(&uri, &[]);
    let dischargeid = params.get("dischargeid").cloned().unwrap_or_default();
    let methods = interaction_methods(&discharger, &dischargeid);

    if !accepts_json {
        return render_visit_page(&methods).into_response();
    }

    Json(VisitMethods { methods }).into_response()
}

/// `POST /visit?dischargeid=…`: completes the pending rendezvous entry.
pub async fn visit_post(
    State(discharger): State<Discharger>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let params = params(&uri, &body);
    let Some(id) = params.get("dischargeid").and_then(|v| v.parse::<u64>().ok()) else {
        return ProtocolError::bad_request("missing or invalid dischargeid").into_response();
    };

    match discharger.checker().finish_interaction(&params).await {
        Ok(caveats) => {
            discharger.rendezvous().complete(id, caveats);
            Json(serde_json::json!({})).into_response()
        }
        Err(err) => {
            discharger.rendezvous().fail(id, err.message.clone());
            err.into_response()
        }
    }
}

/// `GET /wait?dischargeid=…`: blocks until the rendezvous completes, then
/// mints and returns the discharge macaroon the same way `/discharge` does.
pub async fn wait(State(discharger): State<Discharger>, OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Response {
    let version = version_from_headers(&headers);
    let params = params(&uri, &[]);
    let Some(id) = params.get("dischargeid").and_then(|v| v.parse::<u64>().ok()) else {
        return ProtocolError::bad_request("missing or invalid dischargeid").into_response();
    };

    let Some(info) = discharger.rendezvous().info(id) else {
        return ProtocolError::bad_request("unknown dischargeid").into_response();
    };

    match discharger.rendezvous().await_discharge(id, discharger.wait_timeout()).await {
        Ok(caveats) => match discharger.mint(&info, caveats) {
            Ok(macaroon) => Json(MacaroonResponse { macaroon }).into_response(),
            Err(_) => ProtocolError::bad_request("failed to mint discharge macaroon").into_response(),
        },
        Err(bakery_rendezvous::AwaitError::NotCompleted(_)) => {
            ProtocolError::interaction_required("still waiting for interaction to complete", HashMap::new(), version)
                .into_response()
        }
        Err(bakery_rendezvous::AwaitError::Failed(reason)) => ProtocolError::bad_request(reason).into_response(),
        Err(bakery_rendezvous::AwaitError::UnknownId(_)) => {
            ProtocolError::bad_request("unknown dischargeid").into_response()
        }
    }
}

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

//! Drives the real `/discharge` HTTP endpoint with an in-process router, the
//! same way a genuine discharge client would, rather than calling
//! `Discharger::open_caveat`/`mint` directly with hand-matched ids as the
//! crate's own unit tests do.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bakery_discharger::{Discharger, OpenChecker};
use bakery_macaroon::{KeyPair, Macaroon};
use hyper::{Body, Request};
use rand::SeedableRng;
use serde::Deserialize;
use tower::ServiceExt;

fn rng() -> rand_chacha::ChaCha20Rng {
    rand_chacha::ChaCha20Rng::seed_from_u64(31)
}

#[derive(Deserialize)]
struct MacaroonResponse {
    #[serde(rename = "Macaroon")]
    macaroon: Macaroon,
}

#[tokio::test]
async fn discharge_endpoint_mints_a_macaroon_the_root_verifies() {
    let mut r = rng();
    let discharger_keys = KeyPair::generate(&mut r);

    let root_key = b"target secret";
    let third_party_root_key = b"shared secret for this caveat";
    let mut root = Macaroon::new(root_key, "root-id", None);
    root.add_third_party_caveat(
        &mut r,
        "https://idp.example",
        third_party_root_key,
        &discharger_keys.public(),
        "is-member-of: admins",
    )
    .unwrap();
    let (_, caveat_id, verification_id) = root.caveats()[0].as_third_party().unwrap();
    let caveat_id = caveat_id.to_vec();
    let verification_id = verification_id.to_vec();

    let router = Discharger::new(discharger_keys, Arc::new(OpenChecker)).router();

    let body = format!(
        "id64={}&caveat64={}",
        URL_SAFE_NO_PAD.encode(&verification_id),
        URL_SAFE_NO_PAD.encode(&caveat_id),
    );
    let request = Request::post("/discharge")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);

    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let MacaroonResponse { macaroon: mut discharge } = serde_json::from_slice(&bytes).unwrap();

    // The discharge's identifier must be the root's own cleartext caveat
    // id, not the sealed verification id, or `Macaroon::verify` below would
    // never find it among the presented discharges.
    assert_eq!(discharge.identifier(), caveat_id.as_slice());

    root.bind_for_request(&mut discharge);
    let result = root.verify(
        root_key,
        &[discharge],
        &mut |id| if id == caveat_id { Some(third_party_root_key.to_vec()) } else { None },
        &mut |_| true,
    );
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn discharge_endpoint_rejects_a_request_missing_the_cleartext_caveat_id() {
    let mut r = rng();
    let discharger_keys = KeyPair::generate(&mut r);

    let mut root = Macaroon::new(b"target secret", "root-id", None);
    root.add_third_party_caveat(&mut r, "https://idp.example", b"k", &discharger_keys.public(), "cav-1")
        .unwrap();
    let (_, _, verification_id) = root.caveats()[0].as_third_party().unwrap();

    let router = Discharger::new(discharger_keys, Arc::new(OpenChecker)).router();

    let body = format!("id64={}", URL_SAFE_NO_PAD.encode(verification_id));
    let request = Request::post("/discharge")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn visit_lists_interaction_methods_with_typed_params_for_json_callers() {
    let mut r = rng();
    let discharger = Discharger::new(KeyPair::generate(&mut r), Arc::new(OpenChecker))
        .with_location("https://idp.example")
        .with_interaction_kinds(vec!["form".to_owned(), "browser-window".to_owned()]);
    let router = discharger.router();

    let request = Request::get("/visit?dischargeid=7")
        .header(http::header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);

    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let form_url = body["methods"]["form"]["URL"].as_str().unwrap();
    assert!(form_url.contains("dischargeid=7"));
    assert!(body["methods"]["browser-window"]["VisitURL"].as_str().unwrap().contains("dischargeid=7"));
    assert!(body["methods"]["browser-window"]["WaitURL"].as_str().unwrap().contains("/wait"));
}

#[tokio::test]
async fn visit_renders_a_page_for_non_json_callers_instead_of_refusing() {
    let mut r = rng();
    let discharger =
        Discharger::new(KeyPair::generate(&mut r), Arc::new(OpenChecker)).with_interaction_kinds(vec!["form".to_owned()]);
    let router = discharger.router();

    let request = Request::get("/visit?dischargeid=1").body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);
    let content_type = response.headers().get(http::header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.contains("text/html"));
}

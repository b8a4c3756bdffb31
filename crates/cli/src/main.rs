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

//! Demo wiring for the bakery protocol: a target service, a discharger
//! service, and a client that drives a discharge against them, all on
//! loopback. Useful as a manual sanity check and as the nucleus of an
//! end-to-end integration test.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use bakery_authorizer::{Authorizer, Op, OpenAuthorizer};
use bakery_config::{ClientConfig, DischargerConfig, TargetConfig};
use bakery_core::checkers::{self, RequestContext};
use bakery_core::cookie::request_macaroon_slices;
use bakery_core::{BakeryVersion, DerivedRootKeyStore, Error as ProtocolError, SystemClock};
use bakery_discharger::{Discharger, OpenChecker};
use bakery_driver::{DischargeClient, Driver};
use bakery_http::HttpClient;
use bakery_interactors::InteractorRegistry;
use bakery_locator::DefaultLocator;
use bakery_macaroon::{KeyPair, Public};
use bakery_oven::{OpKind, Oven};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use http::HeaderMap;
use hyper::{Body, Request};

#[derive(Parser)]
#[command(name = "bakery-cli", about = "Run a bakery target or discharger, or drive a discharge against one")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a target service that protects a demo endpoint behind a macaroon.
    ServeTarget {
        /// Optional YAML file overriding `TargetConfig`'s defaults; see
        /// `bakery-config` for the `BAKERY_`-prefixed environment overrides
        /// layered on top.
        #[arg(long)]
        config: Option<Utf8PathBuf>,
    },

    /// Run a discharger service that discharges any caveat it's asked to.
    ServeDischarger {
        #[arg(long)]
        config: Option<Utf8PathBuf>,
    },

    /// Generate a fresh Curve25519 key pair and print it as base64.
    GenerateKeypair,

    /// Drive a GET request against `url` through as many discharge rounds as
    /// it takes, printing the final response.
    Discharge {
        #[arg(long)]
        url: String,
        #[arg(long)]
        config: Option<Utf8PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::ServeTarget { config } => serve_target(config).await,
        Command::ServeDischarger { config } => serve_discharger(config).await,
        Command::GenerateKeypair => generate_keypair(),
        Command::Discharge { url, config } => discharge(url, config).await,
    }
}

fn generate_keypair() -> Result<()> {
    let pair = KeyPair::generate(&mut rand::thread_rng());
    println!("public:  {}", STANDARD.encode(pair.public().0));
    println!("private: {}", STANDARD.encode(pair.secret_bytes()));
    Ok(())
}

#[derive(Clone)]
struct TargetState {
    oven: Arc<Oven>,
    authorizer: Arc<dyn Authorizer>,
    discharger_location: String,
    discharger_public_key: Public,
}

const PROTECTED_CONDITION: &str = "is-authenticated";

async fn serve_target(config_path: Option<Utf8PathBuf>) -> Result<()> {
    let config: TargetConfig = bakery_config::load(config_path.as_deref()).context("loading target config")?;

    let locator = DefaultLocator::new(HttpClient::new()).allow_insecure(true);
    let discharger_info = locator
        .third_party_info(&config.discharger_location)
        .await
        .context("could not resolve the discharger's public key")?;

    let root_key_store = Arc::new(DerivedRootKeyStore::new(config.root_key_secret.clone()));
    let oven = Arc::new(
        Oven::new(config.location.clone(), root_key_store, Arc::new(SystemClock))
            .with_authz_expiry(chrono::Duration::seconds(config.authz_expiry_secs))
            .with_authn_expiry(chrono::Duration::seconds(config.authn_expiry_secs)),
    );

    let state = TargetState {
        oven,
        authorizer: Arc::new(OpenAuthorizer),
        discharger_location: config.discharger_location.clone(),
        discharger_public_key: discharger_info.public_key,
    };

    let listen: SocketAddr = config.listen_addr.parse().context("listen_addr is not a valid socket address")?;
    tracing::info!(%listen, location = %config.location, "starting target");

    let app = Router::new()
        .route("/", get(protected))
        .with_state(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    axum::Server::bind(&listen).serve(app).await.context("target server failed")?;
    Ok(())
}

async fn protected(State(state): State<TargetState>, connect_info: Option<ConnectInfo<SocketAddr>>, headers: HeaderMap) -> Response {
    let version = BakeryVersion::parse(headers.get(BakeryVersion::HEADER_NAME).and_then(|v| v.to_str().ok()));
    let ctx = RequestContext::new(connect_info.map(|c| c.0.ip()), &headers);
    let cookie_header = headers.get(http::header::COOKIE).and_then(|v| v.to_str().ok());

    for slice in request_macaroon_slices(&[], cookie_header) {
        let Some((primary, discharges)) = slice.split_first() else {
            continue;
        };
        let verified = state
            .oven
            .verify(primary, discharges, &mut |predicate| check_predicate(predicate, &ctx));
        if verified.is_err() {
            continue;
        }

        let op = Op::new("/", "read");
        match state.authorizer.authorize(None, &[op]).await {
            Ok((allowed, _caveats)) if allowed.first().copied().unwrap_or(false) => {
                return axum::Json(serde_json::json!({"hello": "authenticated"})).into_response();
            }
            Ok(_) => return ProtocolError::bad_request("not authorized for this resource").into_response(),
            Err(err) => return ProtocolError::bad_request(err.to_string()).into_response(),
        }
    }

    match state.oven.discharge_required_error(
        OpKind::Authz,
        state.discharger_location.clone(),
        state.discharger_public_key,
        PROTECTED_CONDITION,
        "/",
        version,
    ) {
        Ok(err) => err.into_response(),
        Err(_) => ProtocolError::bad_request("failed to mint macaroon").into_response(),
    }
}

fn check_predicate(predicate: &str, ctx: &RequestContext) -> bool {
    if let Some(expires) = bakery_core::cookie::parse_time_before(predicate) {
        return chrono::Utc::now() < expires;
    }
    checkers::check(ctx, predicate).is_ok()
}

async fn serve_discharger(config_path: Option<Utf8PathBuf>) -> Result<()> {
    let config: DischargerConfig = bakery_config::load(config_path.as_deref()).context("loading discharger config")?;

    let keypair = KeyPair::generate(&mut rand::thread_rng());
    tracing::info!(public_key = %STANDARD.encode(keypair.public().0), "generated discharger key pair for this run");

    let listen: SocketAddr = config.listen_addr.parse().context("listen_addr is not a valid socket address")?;
    tracing::info!(%listen, location = %config.location, "starting discharger");

    let discharger = Discharger::new(keypair, Arc::new(OpenChecker))
        .with_location(config.location)
        .with_interaction_kinds(config.interaction_kinds)
        .with_wait_timeout(std::time::Duration::from_secs(config.wait_timeout_secs));

    let app = discharger.router().into_make_service_with_connect_info::<SocketAddr>();

    axum::Server::bind(&listen).serve(app).await.context("discharger server failed")?;
    Ok(())
}

async fn discharge(url: String, config_path: Option<Utf8PathBuf>) -> Result<()> {
    let config: ClientConfig = bakery_config::load(config_path.as_deref()).context("loading client config")?;
    let uri: http::Uri = url.parse().context("not a valid URL")?;

    let http = HttpClient::new();
    let discharge_client = DischargeClient::new(http.clone(), InteractorRegistry::new(vec![]));
    let driver = Driver::new(http, discharge_client).with_max_retries(config.max_discharge_retries);

    let response = driver
        .do_request(|| {
            Request::builder()
                .uri(uri.clone())
                .body(Body::empty())
                .map_err(|err| bakery_driver::DriverError::InvalidLocation(err.to_string()))
        })
        .await
        .context("request did not complete")?;

    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.context("reading response body")?;
    println!("status: {status}");
    println!("body: {}", String::from_utf8_lossy(&body));
    Ok(())
}

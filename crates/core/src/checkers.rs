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

//! First-party caveat conditions that depend on the HTTP request a macaroon
//! was presented with: `http:client-ip-addr` and `http:origin`.
//!
//! These are checked against a [`RequestContext`] captured at the handler
//! that verifies the macaroon, not against the request that originally
//! minted it.

use std::net::IpAddr;

use http::HeaderMap;

/// The namespace every condition in this module is registered under.
pub const NAMESPACE: &str = "http";

/// Whatever a [`crate::Macaroon`] verifier needs from the current request to
/// decide `http:` caveats.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub peer_addr: Option<IpAddr>,
    pub origin: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(peer_addr: Option<IpAddr>, headers: &HeaderMap) -> Self {
        let origin = headers
            .get(http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Self { peer_addr, origin }
    }
}

/// Why an `http:` caveat was rejected.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CheckerError {
    #[error("caveat {0:?} not in the http: namespace")]
    WrongNamespace(String),

    #[error("unknown http: caveat condition {0:?}")]
    UnknownCondition(String),

    #[error("request has no client IP address")]
    NoClientAddr,

    #[error("client IP address {got} does not match caveat {want}")]
    ClientAddrMismatch { want: IpAddr, got: IpAddr },

    #[error("malformed IP address in caveat: {0:?}")]
    MalformedAddr(String),

    #[error("request origin {got:?} does not match caveat {want:?}")]
    OriginMismatch { want: String, got: Option<String> },
}

/// Checks a single first-party caveat predicate against `ctx`.
///
/// Returns `Ok(())` if `predicate` is not in the `http:` namespace at all —
/// callers compose this with other namespaces' checkers and only this one
/// understands `http:`-prefixed conditions.
pub fn check(ctx: &RequestContext, predicate: &str) -> Result<(), CheckerError> {
    let Some(rest) = predicate.strip_prefix("http:") else {
        return Ok(());
    };

    let (condition, arg) = rest.split_once(' ').unwrap_or((rest, ""));

    match condition {
        "client-ip-addr" => check_client_ip_addr(ctx, arg),
        "origin" => check_origin(ctx, arg),
        other => Err(CheckerError::UnknownCondition(other.to_owned())),
    }
}

fn check_client_ip_addr(ctx: &RequestContext, arg: &str) -> Result<(), CheckerError> {
    let want: IpAddr = arg.parse().map_err(|_| CheckerError::MalformedAddr(arg.to_owned()))?;
    let got = ctx.peer_addr.ok_or(CheckerError::NoClientAddr)?;

    if canonical(want) == canonical(got) {
        Ok(())
    } else {
        Err(CheckerError::ClientAddrMismatch { want, got })
    }
}

fn check_origin(ctx: &RequestContext, arg: &str) -> Result<(), CheckerError> {
    let want = arg.to_owned();
    let got = ctx.origin.clone();
    let matches = match &got {
        Some(origin) => origin == &want,
        None => want.is_empty(),
    };
    if matches {
        Ok(())
    } else {
        Err(CheckerError::OriginMismatch { want, got })
    }
}

/// Canonicalize an IP so an IPv4-mapped IPv6 address compares equal to the
/// bare IPv4 address it maps.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

/// Synthesize a `http:client-ip-addr` caveat predicate bound to the current
/// request's peer address.
///
/// When the request carries no usable remote address, returns a predicate
/// that always fails verification with a descriptive error rather than
/// silently granting access.
#[must_use]
pub fn same_client_ip_addr_caveat(ctx: &RequestContext) -> String {
    match ctx.peer_addr {
        Some(addr) => format!("http:client-ip-addr {addr}"),
        None => "http:client-ip-addr unknown-request-had-no-peer-address".to_owned(),
    }
}

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

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::str_to_string, rustdoc::broken_intra_doc_links)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

//! The discharger (C5): mints discharge macaroons for third-party caveats
//! by delegating the decision of whether and how to a pluggable
//! [`Checker`], and parks interactive sessions in a [`Rendezvous`] (C6)
//! until something outside the request completes them.
//!
//! # Wire encoding of a caveat id
//!
//! `bakery-macaroon`'s sealed verification id is opaque ciphertext with no
//! room for a cleartext condition alongside the root key. This discharger
//! resolves that by treating the wire `id`/`id64` parameter of `POST
//! /discharge` as the verification id itself (opened directly with this
//! discharger's key to recover the root key), and `caveat64` as the
//! root macaroon's own cleartext caveat id — the exact bytes
//! `Macaroon::add_third_party_caveat` was called with. That cleartext id
//! doubles as the checker's `condition` and as the identifier the discharge
//! macaroon is minted with, since [`bakery_macaroon::Macaroon::verify`]
//! looks a discharge up by matching its identifier against the root
//! caveat's cleartext id, not against the ciphertext. `caveat64` is
//! therefore mandatory: [`Discharger::open_caveat`] rejects a request that
//! omits it rather than guessing a condition from the ciphertext.

mod checker;
mod handlers;

pub use checker::{CheckOutcome, Checker, OpenChecker};

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use bakery_core::{NewCaveat, ThirdPartyCaveatInfo};
use bakery_locator::ThirdPartyLocator;
use bakery_macaroon::{KeyPair, Macaroon, MacaroonError, Public};
use bakery_rendezvous::Rendezvous;
use rand::RngCore;
use tower_http::cors::CorsLayer;

struct Inner {
    keypair: KeyPair,
    checker: Arc<dyn Checker>,
    locator: Option<Arc<dyn ThirdPartyLocator>>,
    rendezvous: Rendezvous,
    interaction_kinds: Vec<String>,
    wait_timeout: Duration,
    location: Option<String>,
}

/// A discharger service: its own key, a checker, and a rendezvous for
/// interactive sessions. Cheaply cloneable for use as axum router state.
#[derive(Clone)]
pub struct Discharger {
    inner: Arc<Inner>,
}

impl Discharger {
    #[must_use]
    pub fn new(keypair: KeyPair, checker: Arc<dyn Checker>) -> Self {
        Self {
            inner: Arc::new(Inner {
                keypair,
                checker,
                locator: None,
                rendezvous: Rendezvous::new(),
                interaction_kinds: Vec::new(),
                wait_timeout: Duration::from_secs(60),
                location: None,
            }),
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn ThirdPartyLocator>) -> Self {
        Arc::get_mut(&mut self.inner).expect("builder used before sharing").locator = Some(locator);
        self
    }

    #[must_use]
    pub fn with_interaction_kinds(mut self, kinds: Vec<String>) -> Self {
        Arc::get_mut(&mut self.inner).expect("builder used before sharing").interaction_kinds = kinds;
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        Arc::get_mut(&mut self.inner).expect("builder used before sharing").wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        Arc::get_mut(&mut self.inner).expect("builder used before sharing").location = Some(location.into());
        self
    }

    #[must_use]
    pub fn public_key(&self) -> Public {
        self.inner.keypair.public()
    }

    pub(crate) fn checker(&self) -> &Arc<dyn Checker> {
        &self.inner.checker
    }

    /// The locator a [`Checker`] can use to resolve a further third-party
    /// caveat's discharger key when chaining discharges, if one was
    /// configured.
    #[must_use]
    pub fn locator(&self) -> Option<&Arc<dyn ThirdPartyLocator>> {
        self.inner.locator.as_ref()
    }

    pub(crate) fn rendezvous(&self) -> &Rendezvous {
        &self.inner.rendezvous
    }

    pub(crate) fn interaction_kinds(&self) -> &[String] {
        &self.inner.interaction_kinds
    }

    pub(crate) fn wait_timeout(&self) -> Duration {
        self.inner.wait_timeout
    }

    pub(crate) fn location(&self) -> Option<&str> {
        self.inner.location.as_deref()
    }

    /// Park a third-party caveat awaiting interactive discharge.
    /// `verification_id` is the raw ciphertext the caveat was sealed under
    /// (the wire `id`/`id64` parameter), kept apart from `info.caveat_id`
    /// so a later [`Rendezvous::check_token`] can confirm a redemption
    /// still names exactly this caveat. Returns the rendezvous id a checker
    /// embeds in its `interaction-required` params (e.g. as
    /// `?dischargeid=…` in a `VisitURL`).
    #[must_use]
    pub fn park(&self, verification_id: Vec<u8>, info: ThirdPartyCaveatInfo) -> u64 {
        self.inner.rendezvous.new_discharge(bakery_rendezvous::ParkedCaveat { verification_id, info })
    }

    /// Recover a third-party caveat's decrypted info from the wire
    /// parameters of `POST /discharge`. See the module docs for the
    /// `id`/`caveat64` encoding this discharger expects: `verification_id`
    /// is the sealed ciphertext opened with this discharger's key;
    /// `caveat_id` is the root macaroon's own cleartext caveat id, required
    /// because it is what the minted discharge's identifier must equal for
    /// [`bakery_macaroon::Macaroon::verify`] to find it.
    pub(crate) fn open_caveat(&self, verification_id: &[u8], caveat_id: &[u8]) -> Result<ThirdPartyCaveatInfo, bakery_core::Error> {
        let root_key = Macaroon::open_third_party_root_key(&self.inner.keypair, verification_id)
            .map_err(|_| bakery_core::Error::bad_request("could not open the caveat's verification id with this discharger's key"))?;

        if caveat_id.is_empty() {
            return Err(bakery_core::Error::bad_request(
                "missing caveat64: the root macaroon's cleartext caveat id for this caveat",
            ));
        }

        Ok(ThirdPartyCaveatInfo {
            condition: caveat_id.to_vec(),
            caveat_id: caveat_id.to_vec(),
            caveat: caveat_id.to_vec(),
            root_key,
            first_party_public_key: None,
            discharger_public_key: self.public_key(),
            macaroon_id: Vec::new(),
            namespace: "std".to_owned(),
        })
    }

    /// Mint a discharge macaroon for `info`, with `caveats` attached by the
    /// checker. The caller (the client's discharge driver) is responsible
    /// for binding the result to the root macaroon before use.
    pub(crate) fn mint(&self, info: &ThirdPartyCaveatInfo, caveats: Vec<NewCaveat>) -> Result<Macaroon, MacaroonError> {
        let mut discharge = Macaroon::new(&info.root_key, info.caveat_id.clone(), self.inner.location.clone());

        let mut rng = rand::thread_rng();
        for caveat in caveats {
            match caveat {
                NewCaveat::FirstParty(predicate) => discharge.add_first_party_caveat(predicate),
                NewCaveat::ThirdParty {
                    location,
                    condition,
                    discharger_public_key,
                } => {
                    let mut third_party_root_key = [0u8; 32];
                    rng.fill_bytes(&mut third_party_root_key);
                    discharge.add_third_party_caveat(
                        &mut rng,
                        location,
                        &third_party_root_key,
                        &discharger_public_key,
                        condition.into_bytes(),
                    )?;
                }
            }
        }

        Ok(discharge)
    }

    /// Build the axum router for this discharger's HTTP surface (§6.1):
    /// `/discharge`, `/publickey`, `/discharge/info`, and the interactive
    /// `/visit`/`/wait` pair.
    #[must_use]
    pub fn router(self) -> Router {
        Router::new()
            .route("/discharge", post(handlers::discharge))
            .route("/publickey", get(handlers::public_key))
            .route("/discharge/info", get(handlers::discharge_info))
            .route("/visit", get(handlers::visit_get).post(handlers::visit_post))
            .route("/wait", get(handlers::wait))
            .layer(CorsLayer::permissive())
            .with_state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_core::checkers::RequestContext;
    use bakery_core::DischargeToken;
    use rand::SeedableRng;

    fn rng() -> rand_chacha::ChaCha20Rng {
        rand_chacha::ChaCha20Rng::seed_from_u64(5)
    }

    struct RecordingChecker;

    #[async_trait::async_trait]
    impl Checker for RecordingChecker {
        async fn check(
            &self,
            _ctx: &RequestContext,
            info: &ThirdPartyCaveatInfo,
            _token: Option<&DischargeToken>,
        ) -> CheckOutcome {
            CheckOutcome::Caveats(vec![NewCaveat::FirstParty(String::from_utf8_lossy(&info.condition).into_owned())])
        }
    }

    #[tokio::test]
    async fn discharge_round_trip_through_open_and_mint() {
        let mut r = rng();
        let discharger_keys = KeyPair::generate(&mut r);
        let discharger = Discharger::new(discharger_keys.clone(), Arc::new(RecordingChecker));

        let root_key = b"shared secret";
        // Reuse a throwaway root macaroon purely to get at a real sealed
        // verification id, the same way the macaroon crate's own tests do.
        let mut throwaway = Macaroon::new(b"unrelated", "root", None);
        throwaway
            .add_third_party_caveat(&mut r, "https://idp.example", root_key, &discharger_keys.public(), "cav-1")
            .unwrap();
        let (_, caveat_id, verification_id) = throwaway.caveats()[0].as_third_party().unwrap();

        let info = discharger.open_caveat(verification_id, caveat_id).unwrap();
        assert_eq!(info.root_key, root_key);
        assert_eq!(info.condition, b"cav-1");

        let ctx = RequestContext::new(None, &http::HeaderMap::new());
        let outcome = discharger.checker().check(&ctx, &info, None).await;
        let caveats = match outcome {
            CheckOutcome::Caveats(c) => c,
            _ => panic!("expected caveats"),
        };

        let macaroon = discharger.mint(&info, caveats).unwrap();
        assert_eq!(macaroon.caveats().len(), 1);
        // The discharge's identifier must equal the root's own cleartext
        // caveat id, not the sealed verification id, or the root's
        // `Macaroon::verify` will never find it among the presented
        // discharges.
        assert_eq!(macaroon.identifier(), caveat_id);
    }

    #[test]
    fn open_caveat_rejects_missing_cleartext_id() {
        let mut r = rng();
        let discharger_keys = KeyPair::generate(&mut r);
        let discharger = Discharger::new(discharger_keys.clone(), Arc::new(OpenChecker));

        let mut throwaway = Macaroon::new(b"unrelated", "root", None);
        throwaway
            .add_third_party_caveat(&mut r, "https://idp.example", b"k", &discharger_keys.public(), "cav-1")
            .unwrap();
        let (_, _, verification_id) = throwaway.caveats()[0].as_third_party().unwrap();

        assert!(discharger.open_caveat(verification_id, b"").is_err());
    }

    #[test]
    fn park_and_info_round_trip() {
        let mut r = rng();
        let discharger = Discharger::new(KeyPair::generate(&mut r), Arc::new(OpenChecker));
        let info = ThirdPartyCaveatInfo {
            condition: b"x".to_vec(),
            caveat_id: b"cav-1".to_vec(),
            caveat: Vec::new(),
            root_key: b"k".to_vec(),
            first_party_public_key: None,
            discharger_public_key: discharger.public_key(),
            macaroon_id: Vec::new(),
            namespace: "std".to_owned(),
        };
        let id = discharger.park(b"raw-verification-id".to_vec(), info.clone());
        let fetched = discharger.rendezvous().info(id).unwrap();
        assert_eq!(fetched.caveat_id, info.caveat_id);
    }
}

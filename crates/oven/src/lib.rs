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

//! The oven (C10): a target service's one door into minting macaroons.
//!
//! Checkers and handlers never call [`bakery_macaroon::Macaroon::new`]
//! directly; they go through an [`Oven`], which picks the identifier, looks
//! up the root key from a [`bakery_core::RootKeyStore`], and attaches the
//! expiry caveat appropriate to what the macaroon authenticates. This keeps
//! every macaroon a target mints verifiable later without server-side
//! session state: the identifier alone is enough for [`Oven::verify`] (via
//! the same root key store) to recover the key it was minted with.

use std::sync::Arc;

use bakery_core::cookie::time_before_caveat;
use bakery_core::{BakeryVersion, Clock, Error as ProtocolError, NewCaveat, RootKeyStore};
use bakery_macaroon::{KeyPair, Macaroon, MacaroonError, Public};
use chrono::Duration;
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OvenError {
    #[error(transparent)]
    Macaroon(#[from] MacaroonError),
}

/// What kind of macaroon is being minted, so the oven can pick the right
/// default expiry. A deployment wiring its own operations can grow this
/// enum; the two here cover the protocol's own C1/C9 flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// A macaroon authorizing a single request or resource.
    Authz,
    /// A macaroon standing in for a logged-in identity, handed out after a
    /// third-party discharge completes (C9's cookie jar).
    IdentityLogin,
}

/// Mints and (optionally) verifies macaroons on behalf of a target service.
pub struct Oven {
    location: String,
    root_key_store: Arc<dyn RootKeyStore>,
    clock: Arc<dyn Clock>,
    authz_expiry: Duration,
    authn_expiry: Duration,
}

impl Oven {
    #[must_use]
    pub fn new(location: impl Into<String>, root_key_store: Arc<dyn RootKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            location: location.into(),
            root_key_store,
            clock,
            authz_expiry: Duration::minutes(5),
            authn_expiry: Duration::hours(24),
        }
    }

    #[must_use]
    pub fn with_authz_expiry(mut self, expiry: Duration) -> Self {
        self.authz_expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_authn_expiry(mut self, expiry: Duration) -> Self {
        self.authn_expiry = expiry;
        self
    }

    fn expiry_for(&self, kind: OpKind) -> Duration {
        match kind {
            OpKind::Authz => self.authz_expiry,
            OpKind::IdentityLogin => self.authn_expiry,
        }
    }

    /// Mint a fresh macaroon of `kind`, with `extra` caveats (first- or
    /// third-party) attached after the standard `time-before` expiry caveat.
    ///
    /// The identifier is a random 24-byte value; the root key store is
    /// responsible for either remembering it against that identifier or
    /// deriving it deterministically, so a later [`Self::mint`]-independent
    /// process can recover the key from the identifier alone.
    pub fn mint(&self, kind: OpKind, extra: Vec<NewCaveat>) -> Result<Macaroon, OvenError> {
        let mut identifier = vec![0u8; 24];
        rand::thread_rng().fill_bytes(&mut identifier);

        let root_key = self.root_key_store.new_key(&identifier);
        let mut macaroon = Macaroon::new(&root_key, identifier, Some(self.location.clone()));

        let expires_at = self.clock.now() + self.expiry_for(kind);
        macaroon.add_first_party_caveat(time_before_caveat(expires_at));

        let mut rng = rand::thread_rng();
        for caveat in extra {
            match caveat {
                NewCaveat::FirstParty(predicate) => macaroon.add_first_party_caveat(predicate),
                NewCaveat::ThirdParty {
                    location,
                    condition,
                    discharger_public_key,
                } => {
                    let third_party_root_key = self.root_key_store.new_key(condition.as_bytes());
                    macaroon.add_third_party_caveat(
                        &mut rng,
                        location,
                        &third_party_root_key,
                        &discharger_public_key,
                        condition,
                    )?;
                }
            }
        }

        Ok(macaroon)
    }

    /// Mint a macaroon with a single third-party caveat addressed to
    /// `discharger`, and wrap it as a `discharge-required` [`ProtocolError`]
    /// ready to hand back to a client, with a cookie path and version set.
    pub fn discharge_required_error(
        &self,
        kind: OpKind,
        location: impl Into<String>,
        discharger_public_key: Public,
        condition: impl Into<String>,
        cookie_path: impl Into<String>,
        version: BakeryVersion,
    ) -> Result<ProtocolError, OvenError> {
        let caveat = NewCaveat::ThirdParty {
            location: location.into(),
            condition: condition.into(),
            discharger_public_key,
        };
        let macaroon = self.mint(kind, vec![caveat])?;
        Ok(ProtocolError::discharge_required(macaroon, version).with_cookie_path(cookie_path.into()))
    }

    /// Verify a macaroon this oven (or an earlier process sharing its root
    /// key store) minted, resolving both the macaroon's own root key and any
    /// third-party discharge root keys through [`bakery_core::RootKeyStore`].
    pub fn verify(
        &self,
        macaroon: &Macaroon,
        discharges: &[Macaroon],
        check: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), VerifyError> {
        let root_key = self
            .root_key_store
            .get(macaroon.identifier())
            .ok_or(VerifyError::UnknownIdentifier)?;

        macaroon
            .verify(
                &root_key,
                discharges,
                &mut |caveat_id| self.root_key_store.get(caveat_id),
                check,
            )
            .map_err(VerifyError::Macaroon)
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("root key store has no key for this macaroon's identifier")]
    UnknownIdentifier,

    #[error(transparent)]
    Macaroon(#[from] bakery_macaroon::VerificationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_core::{DerivedRootKeyStore, FixedClock};
    use chrono::{TimeZone, Utc};

    fn oven() -> Oven {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        Oven::new(
            "https://target.example",
            Arc::new(DerivedRootKeyStore::new("target secret")),
            Arc::new(clock),
        )
    }

    #[test]
    fn mint_attaches_time_before_caveat() {
        let oven = oven();
        let macaroon = oven.mint(OpKind::Authz, vec![]).unwrap();
        let predicate = macaroon.caveats()[0].as_first_party().unwrap();
        assert!(predicate.starts_with("time-before "));
    }

    #[test]
    fn mint_round_trips_through_verify() {
        let oven = oven();
        let macaroon = oven.mint(OpKind::Authz, vec![]).unwrap();
        let result = oven.verify(&macaroon, &[], &mut |p| p.starts_with("time-before"));
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn verify_fails_for_unknown_identifier() {
        let oven = oven();
        let foreign = Macaroon::new(b"unrelated key", "other-id", None);
        let result = oven.verify(&foreign, &[], &mut |_| true);
        assert!(matches!(result, Err(VerifyError::UnknownIdentifier)));
    }

    #[test]
    fn discharge_required_error_carries_macaroon_and_cookie_path() {
        let oven = oven();
        let mut rng = rand::thread_rng();
        let discharger = KeyPair::generate(&mut rng);

        let err = oven
            .discharge_required_error(
                OpKind::Authz,
                "https://idp.example",
                discharger.public(),
                "is-member-of: admins",
                "/",
                BakeryVersion::LATEST,
            )
            .unwrap();

        assert_eq!(err.code, bakery_core::ErrorCode::DischargeRequired);
        assert_eq!(err.info.macaroon_path.as_deref(), Some("/"));
        assert!(err.info.macaroon.is_some());
    }

    #[test]
    fn identity_login_uses_longer_expiry_than_authz() {
        let oven = oven().with_authz_expiry(Duration::seconds(1)).with_authn_expiry(Duration::days(1));
        let authz = oven.mint(OpKind::Authz, vec![]).unwrap();
        let login = oven.mint(OpKind::IdentityLogin, vec![]).unwrap();

        let authz_expiry = bakery_core::cookie::parse_time_before(authz.caveats()[0].as_first_party().unwrap()).unwrap();
        let login_expiry = bakery_core::cookie::parse_time_before(login.caveats()[0].as_first_party().unwrap()).unwrap();
        assert!(login_expiry > authz_expiry);
    }
}

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

//! The discharger's rendezvous (C6): an in-memory map of interactive
//! discharges parked by a monotonic id until something outside the
//! `/discharge` request — an interactor finishing its protocol at `/visit`
//! — completes them, and a blocked `/wait` request can pick the result up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bakery_core::{DischargeToken, NewCaveat, ThirdPartyCaveatInfo};
use thiserror::Error;

/// The kind tag a [`DischargeToken`] minted by [`Rendezvous::discharge_token`]
/// carries, so a discharger's checker recognizes it without depending on
/// this crate.
pub const TOKEN_KIND: &str = "discharge-id";

/// What a discharger parks when it decides a caveat needs interaction:
/// the decrypted caveat info plus the raw verification id it was sealed
/// under, so [`Rendezvous::check_token`] can confirm a later re-presented
/// token still refers to exactly the caveat that was originally parked.
#[derive(Debug, Clone)]
pub struct ParkedCaveat {
    pub info: ThirdPartyCaveatInfo,
    pub verification_id: Vec<u8>,
}

type CompletionResult = Result<Vec<NewCaveat>, String>;

struct Entry {
    parked: ParkedCaveat,
    result: Mutex<Option<CompletionResult>>,
    notify: tokio::sync::Notify,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AwaitError {
    #[error("no rendezvous entry for discharge id {0}")]
    UnknownId(u64),

    #[error("discharge {0} has not completed yet")]
    NotCompleted(u64),

    #[error("discharge was refused: {0}")]
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("discharge token has kind {0:?}, expected {TOKEN_KIND:?}")]
    WrongKind(String),

    #[error("discharge token names an unknown rendezvous id")]
    UnknownId,

    #[error("discharge token's id has not completed")]
    NotCompleted,

    #[error("discharge token does not match the originally parked caveat")]
    Mismatch,

    #[error("the parked discharge was refused: {0}")]
    Failed(String),
}

/// The discharger's table of in-flight interactive discharges.
///
/// Every method is safe under concurrent callers; completion is delivered
/// through a [`tokio::sync::Notify`] (a broadcast, not a single-consumer
/// channel, precisely so `Await` and a later `CheckToken` can both observe
/// the same completed result).
#[derive(Default)]
pub struct Rendezvous {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<Entry>>>,
}

impl Rendezvous {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a freshly-discovered interactive caveat, returning its id.
    pub fn new_discharge(&self, parked: ParkedCaveat) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = Arc::new(Entry {
            parked,
            result: Mutex::new(None),
            notify: tokio::sync::Notify::new(),
        });
        self.entries.lock().expect("rendezvous mutex poisoned").insert(id, entry);
        id
    }

    /// The caveat info a discharge id was parked with, if it exists.
    #[must_use]
    pub fn info(&self, id: u64) -> Option<ThirdPartyCaveatInfo> {
        self.entries
            .lock()
            .expect("rendezvous mutex poisoned")
            .get(&id)
            .map(|e| e.parked.info.clone())
    }

    fn entry(&self, id: u64) -> Option<Arc<Entry>> {
        self.entries.lock().expect("rendezvous mutex poisoned").get(&id).cloned()
    }

    /// Deliver a successful interaction result.
    ///
    /// # Panics
    ///
    /// Panics if `id` is unknown, or has already been completed: exactly one
    /// of [`Self::complete`]/[`Self::fail`] may ever succeed for a given id,
    /// and a second call is a programmer error in the caller, not a
    /// recoverable runtime condition.
    pub fn complete(&self, id: u64, caveats: Vec<NewCaveat>) {
        self.finish(id, Ok(caveats));
    }

    /// Deliver a failed interaction result. Same one-shot contract as
    /// [`Self::complete`].
    pub fn fail(&self, id: u64, reason: impl Into<String>) {
        self.finish(id, Err(reason.into()));
    }

    fn finish(&self, id: u64, result: CompletionResult) {
        let entry = self.entry(id).unwrap_or_else(|| panic!("rendezvous: DischargeComplete/DischargeFailed on unknown id {id}"));
        let mut slot = entry.result.lock().expect("rendezvous entry mutex poisoned");
        assert!(slot.is_none(), "rendezvous: discharge id {id} completed more than once");
        *slot = Some(result);
        drop(slot);
        entry.notify.notify_waiters();
    }

    /// Block up to `timeout` for `id` to complete. `timeout == Duration::ZERO`
    /// returns immediately with [`AwaitError::NotCompleted`] if it is still
    /// pending, rather than waiting at all.
    pub async fn await_discharge(&self, id: u64, timeout: Duration) -> Result<Vec<NewCaveat>, AwaitError> {
        let entry = self.entry(id).ok_or(AwaitError::UnknownId(id))?;

        if let Some(result) = entry.result.lock().expect("rendezvous entry mutex poisoned").clone() {
            return result.map_err(AwaitError::Failed);
        }

        if timeout.is_zero() {
            return Err(AwaitError::NotCompleted(id));
        }

        let notified = entry.notify.notified();
        if tokio::time::timeout(timeout, notified).await.is_err() {
            return Err(AwaitError::NotCompleted(id));
        }

        entry
            .result
            .lock()
            .expect("rendezvous entry mutex poisoned")
            .clone()
            .ok_or(AwaitError::NotCompleted(id))?
            .map_err(AwaitError::Failed)
    }

    /// Mint the opaque proof-of-interaction a discharger hands back after a
    /// completed interactive discharge, so the client can re-present it
    /// later to bypass interaction for the same caveat.
    pub fn discharge_token(&self, id: u64) -> Result<DischargeToken, TokenError> {
        let entry = self.entry(id).ok_or(TokenError::UnknownId)?;
        let completed = entry.result.lock().expect("rendezvous entry mutex poisoned").is_some();
        if !completed {
            return Err(TokenError::NotCompleted);
        }
        Ok(DischargeToken {
            kind: TOKEN_KIND.to_owned(),
            value: id.to_be_bytes().to_vec(),
        })
    }

    /// Redeem a previously-minted [`DischargeToken`]: verify it names a
    /// completed rendezvous entry whose caveat id and verification id match
    /// `caveat_id`/`verification_id` byte-for-byte, and return the caveats
    /// it completed with.
    pub fn check_token(
        &self,
        token: &DischargeToken,
        caveat_id: &[u8],
        verification_id: &[u8],
    ) -> Result<Vec<NewCaveat>, TokenError> {
        if token.kind != TOKEN_KIND {
            return Err(TokenError::WrongKind(token.kind.clone()));
        }
        let id_bytes: [u8; 8] = token.value.as_slice().try_into().map_err(|_| TokenError::UnknownId)?;
        let id = u64::from_be_bytes(id_bytes);

        let entry = self.entry(id).ok_or(TokenError::UnknownId)?;

        if entry.parked.info.caveat_id != caveat_id || entry.parked.verification_id != verification_id {
            return Err(TokenError::Mismatch);
        }

        entry
            .result
            .lock()
            .expect("rendezvous entry mutex poisoned")
            .clone()
            .ok_or(TokenError::NotCompleted)?
            .map_err(TokenError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked(caveat_id: &[u8], verification_id: &[u8]) -> ParkedCaveat {
        ParkedCaveat {
            info: ThirdPartyCaveatInfo {
                condition: b"is-member-of: admins".to_vec(),
                caveat_id: caveat_id.to_vec(),
                caveat: Vec::new(),
                root_key: b"root key".to_vec(),
                first_party_public_key: None,
                discharger_public_key: test_public_key(),
                macaroon_id: b"root-id".to_vec(),
                namespace: "std".to_owned(),
            },
            verification_id: verification_id.to_vec(),
        }
    }

    fn test_public_key() -> bakery_macaroon::Public {
        let mut rng = rand_chacha_for_tests();
        bakery_macaroon::KeyPair::generate(&mut rng).public()
    }

    fn rand_chacha_for_tests() -> rand_chacha::ChaCha20Rng {
        use rand::SeedableRng;
        rand_chacha::ChaCha20Rng::seed_from_u64(99)
    }

    #[tokio::test]
    async fn await_with_zero_timeout_reports_pending() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        let result = r.await_discharge(id, Duration::ZERO).await;
        assert_eq!(result, Err(AwaitError::NotCompleted(id)));
    }

    #[tokio::test]
    async fn complete_then_await_returns_caveats() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        r.complete(id, vec![NewCaveat::FirstParty("test pass".to_owned())]);

        let caveats = r.await_discharge(id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(caveats.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_awaiters_both_observe_completion() {
        let r = Arc::new(Rendezvous::new());
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));

        let r2 = Arc::clone(&r);
        let waiter = tokio::spawn(async move { r2.await_discharge(id, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        r.complete(id, vec![NewCaveat::FirstParty("ok".to_owned())]);

        let from_task = waiter.await.unwrap().unwrap();
        let from_main = r.await_discharge(id, Duration::ZERO).await.unwrap();
        assert_eq!(from_task.len(), from_main.len());
    }

    #[tokio::test]
    #[should_panic(expected = "completed more than once")]
    async fn double_completion_is_fatal() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        r.complete(id, vec![]);
        r.complete(id, vec![]);
    }

    #[tokio::test]
    async fn fail_surfaces_reason_through_await() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        r.fail(id, "user declined");

        let err = r.await_discharge(id, Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, AwaitError::Failed("user declined".to_owned()));
    }

    #[tokio::test]
    async fn discharge_token_requires_completion() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        assert_eq!(r.discharge_token(id).unwrap_err(), TokenError::NotCompleted);

        r.complete(id, vec![]);
        let token = r.discharge_token(id).unwrap();
        assert_eq!(token.kind, TOKEN_KIND);
    }

    #[tokio::test]
    async fn check_token_rejects_mismatched_caveat() {
        let r = Rendezvous::new();
        let id = r.new_discharge(parked(b"cav-1", b"vid-1"));
        r.complete(id, vec![NewCaveat::FirstParty("pass".to_owned())]);
        let token = r.discharge_token(id).unwrap();

        assert_eq!(r.check_token(&token, b"cav-1", b"vid-1").unwrap().len(), 1);
        assert_eq!(r.check_token(&token, b"wrong-id", b"vid-1").unwrap_err(), TokenError::Mismatch);
    }

    #[tokio::test]
    async fn check_token_rejects_wrong_kind() {
        let token = DischargeToken {
            kind: "agent".to_owned(),
            value: vec![0; 8],
        };
        let r = Rendezvous::new();
        assert!(matches!(r.check_token(&token, b"x", b"y"), Err(TokenError::WrongKind(_))));
    }
}

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

//! The client-side interactor registry (C7): pluggable strategies for
//! turning an `interaction-required` error into a [`DischargeToken`],
//! without the discharge driver (C8) needing to know which one ran.

pub mod agent;
pub mod browser;
mod error;
pub mod form;

pub use error::InteractError;

use bakery_core::{DischargeToken, Error as ProtocolError};
use bakery_http::HttpClient;

/// A named client-side interaction strategy.
#[async_trait::async_trait]
pub trait Interactor: Send + Sync {
    /// The key this interactor answers to in an error's `interactionMethods`.
    fn kind(&self) -> &str;

    /// Run this interactor's protocol against an `interaction-required`
    /// error naming it, producing a discharge token to retry the discharge
    /// request with.
    async fn interact(
        &self,
        http: &HttpClient,
        location: &str,
        error: &ProtocolError,
    ) -> Result<DischargeToken, InteractError>;

    /// Run the legacy visit/wait protocol, for dischargers that predate the
    /// interactor registry and only advertise `VisitURL`/`WaitURL`. Most
    /// interactors don't support this; [`browser::BrowserInteractor`] does.
    async fn legacy_interact(
        &self,
        _http: &HttpClient,
        _visit_url: &str,
        _wait_url: &str,
    ) -> Result<DischargeToken, InteractError> {
        Err(InteractError::LegacyNotSupported)
    }
}

/// An ordered, immutable list of interactors, consulted in registration
/// order: the first whose [`Interactor::kind`] is a key in the error's
/// `interactionMethods` wins.
pub struct InteractorRegistry {
    interactors: Vec<Box<dyn Interactor>>,
}

impl InteractorRegistry {
    #[must_use]
    pub fn new(interactors: Vec<Box<dyn Interactor>>) -> Self {
        Self { interactors }
    }

    /// Resolve an `interaction-required` error to a discharge token by
    /// running the first matching registered interactor, falling back to
    /// the legacy visit/wait protocol if no `kind()` matches but the error
    /// carries `VisitURL`/`WaitURL`.
    pub async fn resolve(
        &self,
        http: &HttpClient,
        location: &str,
        error: &ProtocolError,
    ) -> Result<DischargeToken, InteractError> {
        for interactor in &self.interactors {
            if error.info.interaction_methods.contains_key(interactor.kind()) {
                return interactor.interact(http, location, error).await;
            }
        }

        if let (Some(visit_url), Some(wait_url)) = (&error.info.legacy_visit_url, &error.info.legacy_wait_url) {
            for interactor in &self.interactors {
                match interactor.legacy_interact(http, visit_url, wait_url).await {
                    Err(InteractError::LegacyNotSupported) => continue,
                    other => return other,
                }
            }
        }

        Err(InteractError::MethodNotFound)
    }
}

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

use bakery_core::{checkers::RequestContext, DischargeToken, Error as ProtocolError, NewCaveat, ThirdPartyCaveatInfo};

/// What a [`Checker`] decides for a single caveat: mint it (possibly with
/// further caveats attached), demand interaction, or refuse outright.
pub enum CheckOutcome {
    /// Discharge succeeds; these caveats (first- or third-party) are added
    /// to the discharge macaroon before it is minted.
    Caveats(Vec<NewCaveat>),

    /// The caller must complete an out-of-band interaction before this
    /// caveat can be discharged. Returned to the client verbatim as an
    /// `interaction-required` error.
    InteractionRequired(HashMap<String, serde_json::Value>),

    /// Any other refusal, mapped straight to the wire error.
    Error(ProtocolError),
}

/// The discharger's caveat-checking callback (C5's sole extension point).
///
/// A checker decides, for a single third-party caveat, whether to
/// discharge it, and with what. It never touches macaroon internals
/// directly — see [`CheckOutcome`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(
        &self,
        ctx: &RequestContext,
        info: &ThirdPartyCaveatInfo,
        token: Option<&DischargeToken>,
    ) -> CheckOutcome;

    /// Complete a parked interactive discharge (invoked by `POST /visit`).
    /// The default rejects every interaction kind; interactive checkers
    /// override this to validate whatever parameters their registered
    /// interaction method sends back.
    async fn finish_interaction(&self, _params: &HashMap<String, String>) -> Result<Vec<NewCaveat>, ProtocolError> {
        Err(ProtocolError::bad_request("this discharger does not support interactive discharge"))
    }
}

/// A checker that unconditionally discharges every caveat with no further
/// caveats attached. Useful for tests and the simplest demo deployments.
pub struct OpenChecker;

#[async_trait::async_trait]
impl Checker for OpenChecker {
    async fn check(
        &self,
        _ctx: &RequestContext,
        _info: &ThirdPartyCaveatInfo,
        _token: Option<&DischargeToken>,
    ) -> CheckOutcome {
        CheckOutcome::Caveats(Vec::new())
    }
}

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

//! Shared vocabulary for the bakery protocol: the clock abstraction, the
//! wire error taxonomy, the data model third-party caveats are described
//! with, and the root key store that makes caveat discharge verifiable
//! across separate HTTP requests.

pub mod checkers;
mod clock;
pub mod cookie;
mod error;
mod model;
mod root_key_store;
mod version;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, ErrorCode, ErrorInfo};
pub use model::{DischargeToken, NewCaveat, ThirdPartyCaveatInfo, ThirdPartyInfo};
pub use root_key_store::{DerivedRootKeyStore, InMemoryRootKeyStore, RootKeyStore};
pub use version::BakeryVersion;

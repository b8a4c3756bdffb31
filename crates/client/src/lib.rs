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

//! The client half of the bakery protocol: discharging a macaroon's
//! third-party caveats (C4), driving a request through however many
//! discharge rounds it takes (C8), and remembering the result in a
//! path-scoped cookie jar (C9's client side).

mod client;
mod cookie_jar;
mod driver;
mod error;

pub use client::DischargeClient;
pub use cookie_jar::CookieJar;
pub use driver::Driver;
pub use error::DriverError;

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

//! The thin HTTP plumbing shared by the pieces of the bakery protocol that
//! make outbound RPC calls: the third-party locator (C3) and the discharge
//! client (C4). Also home to the process-wide TLS skip-verify switch (§4.5)
//! used for local testing.

pub mod client;
mod error;
pub mod tls;

pub use client::{is_success, query_string, HttpClient};
pub use error::HttpClientError;

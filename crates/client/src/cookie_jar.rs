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

//! A minimal path-scoped cookie jar for the discharge driver (C9's client
//! side). The `cookie` crate's own `CookieJar` tracks cookies by name only
//! and has no notion of `MacaroonsForURL`-style path scoping, which the
//! driver needs to decide which stored slices apply to a given retry
//! request; this is a deliberately small replacement covering just that.

use std::sync::Mutex;

use time::OffsetDateTime;

struct StoredCookie {
    name: String,
    value: String,
    path: String,
    expires: Option<OffsetDateTime>,
}

/// Cookies accumulated across a driver's requests, scoped by path prefix
/// the way a browser would scope them for a single origin.
#[derive(Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<StoredCookie>>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `cookie`, replacing any existing cookie of the same name so a
    /// retry that reuses a stable cookie-name suffix (e.g. `auth`) updates
    /// in place rather than accumulating stale entries.
    pub fn set(&self, cookie: cookie::Cookie<'_>) {
        let expires = cookie.expires().and_then(|e| match e {
            cookie::Expiration::DateTime(dt) => Some(dt),
            cookie::Expiration::Session => None,
        });
        let entry = StoredCookie {
            name: cookie.name().to_owned(),
            value: cookie.value().to_owned(),
            path: cookie.path().unwrap_or("/").to_owned(),
            expires,
        };

        let mut cookies = self.cookies.lock().expect("cookie jar mutex poisoned");
        cookies.retain(|c| c.name != entry.name);
        cookies.push(entry);
    }

    /// The `Cookie:` header value carrying every non-expired cookie whose
    /// path prefixes `request_path`, or `None` if there are none.
    #[must_use]
    pub fn header_for_path(&self, request_path: &str) -> Option<String> {
        let now = OffsetDateTime::now_utc();
        let mut cookies = self.cookies.lock().expect("cookie jar mutex poisoned");
        cookies.retain(|c| c.expires.map_or(true, |e| e > now));

        let matching: Vec<String> = cookies
            .iter()
            .filter(|c| request_path.starts_with(c.path.as_str()))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if matching.is_empty() {
            None
        } else {
            Some(matching.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_macaroon::Macaroon;

    fn slice_cookie(path: &str) -> cookie::Cookie<'static> {
        let slice = vec![Macaroon::new(b"k", "id", None)];
        bakery_core::cookie::build_cookie(Some("auth"), &slice, path).unwrap()
    }

    #[test]
    fn cookie_scoped_to_matching_path_is_returned() {
        let jar = CookieJar::new();
        jar.set(slice_cookie("/app"));
        assert!(jar.header_for_path("/app/sub").is_some());
        assert!(jar.header_for_path("/other").is_none());
    }

    #[test]
    fn setting_same_name_replaces_rather_than_accumulates() {
        let jar = CookieJar::new();
        jar.set(slice_cookie("/"));
        jar.set(slice_cookie("/"));
        let header = jar.header_for_path("/").unwrap();
        assert_eq!(header.matches("macaroon-auth=").count(), 1);
    }
}

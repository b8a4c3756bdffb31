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

//! Encoding a discharged macaroon slice as a cookie or header, and reading
//! it back out of a request.
//!
//! A "slice" here is `[primary, discharge_1, discharge_2, ...]`: the root
//! macaroon a target minted, followed by every macaroon that discharges one
//! of its third-party caveats, bound to the primary's signature.

use base64::{engine::general_purpose::STANDARD, Engine};
use bakery_macaroon::Macaroon;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

/// Alternative to cookies: repeatable, each value a base64-JSON slice.
pub const HEADER_NAME: &str = "Macaroons";

/// Every cookie whose name starts with this prefix carries a macaroon slice.
pub const COOKIE_NAME_PREFIX: &str = "macaroon-";

/// The first-party caveat predicate convention for expiry: `time-before
/// <RFC3339 timestamp>`. Shared by the oven (which mints it) and the cookie
/// transport (which reads it back to compute `Expires`).
const TIME_BEFORE_PREFIX: &str = "time-before ";

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("could not base64-decode cookie value")]
    Base64(#[from] base64::DecodeError),

    #[error("could not decode macaroon slice as JSON")]
    Json(#[from] serde_json::Error),

    #[error("macaroon slice is empty")]
    Empty,
}

/// The cookie/header name for a slice whose primary macaroon is `primary`,
/// using the server-provided `suffix` when present and falling back to the
/// primary's signature hex otherwise.
#[must_use]
pub fn cookie_name(suffix: Option<&str>, primary: &Macaroon) -> String {
    let suffix = suffix.map_or_else(|| primary.signature_hex(), str::to_owned);
    format!("{COOKIE_NAME_PREFIX}{suffix}")
}

/// Serialize a macaroon slice the way both the cookie and header transports
/// encode it on the wire: JSON, then base64 (standard alphabet, padded).
///
/// # Errors
///
/// Returns an error if any macaroon in `slice` fails to serialize.
pub fn encode_slice(slice: &[Macaroon]) -> Result<String, CookieError> {
    let json = serde_json::to_vec(slice)?;
    Ok(STANDARD.encode(json))
}

/// Inverse of [`encode_slice`].
///
/// # Errors
///
/// Returns an error if `value` is not valid base64, or the decoded bytes are
/// not a JSON macaroon slice.
pub fn decode_slice(value: &str) -> Result<Vec<Macaroon>, CookieError> {
    let json = STANDARD.decode(value.trim())?;
    let slice: Vec<Macaroon> = serde_json::from_slice(&json)?;
    if slice.is_empty() {
        return Err(CookieError::Empty);
    }
    Ok(slice)
}

/// The first-party caveat predicate an oven mints to express "this macaroon
/// is void after `at`".
#[must_use]
pub fn time_before_caveat(at: DateTime<Utc>) -> String {
    format!("{TIME_BEFORE_PREFIX}{}", at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Parse a `time-before` caveat predicate back into the timestamp it names,
/// or `None` if `predicate` is not a `time-before` caveat.
#[must_use]
pub fn parse_time_before(predicate: &str) -> Option<DateTime<Utc>> {
    let raw = predicate.strip_prefix(TIME_BEFORE_PREFIX)?;
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// The minimum `time-before` caveat across every macaroon in `slice`, i.e.
/// the `Expires` a cookie carrying this slice should be given. `None` if no
/// macaroon in the slice carries a `time-before` caveat (the cookie is then
/// left as a session cookie).
#[must_use]
pub fn slice_expiry(slice: &[Macaroon]) -> Option<DateTime<Utc>> {
    slice
        .iter()
        .flat_map(bakery_macaroon::Macaroon::caveats)
        .filter_map(|c| c.as_first_party())
        .filter_map(parse_time_before)
        .min()
}

/// Build the `Set-Cookie`-ready [`cookie::Cookie`] for `slice`, scoped to
/// `path` with `Expires` computed from [`slice_expiry`].
///
/// # Errors
///
/// Returns an error if `slice` fails to serialize.
pub fn build_cookie<'c>(
    suffix: Option<&str>,
    slice: &[Macaroon],
    path: impl Into<String>,
) -> Result<cookie::Cookie<'c>, CookieError> {
    let primary = slice.first().ok_or(CookieError::Empty)?;
    let name = cookie_name(suffix, primary);
    let value = encode_slice(slice)?;

    let mut builder = cookie::Cookie::build(name, value).path(path.into()).http_only(true);

    if let Some(expires) = slice_expiry(slice) {
        let offset = time::OffsetDateTime::from_unix_timestamp(expires.timestamp())
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
        builder = builder.expires(offset);
    }

    Ok(builder.finish())
}

/// Every macaroon slice found on a request: one per `Macaroons` header
/// value, plus one per cookie whose name starts with `macaroon-`. Entries
/// that fail to decode are skipped (a client should never be able to wedge
/// a target service by sending it garbage cookies).
#[must_use]
pub fn request_macaroon_slices(header_values: &[&str], cookie_header: Option<&str>) -> Vec<Vec<Macaroon>> {
    let mut slices = Vec::new();

    for value in header_values {
        match decode_slice(value) {
            Ok(slice) => slices.push(slice),
            Err(err) => tracing::debug!(%err, "dropping undecodable Macaroons header value"),
        }
    }

    if let Some(raw) = cookie_header {
        for part in raw.split(';') {
            let Ok(parsed) = cookie::Cookie::parse(part.trim().to_owned()) else {
                continue;
            };
            if !parsed.name().starts_with(COOKIE_NAME_PREFIX) {
                continue;
            }
            match decode_slice(parsed.value()) {
                Ok(slice) => slices.push(slice),
                Err(err) => tracing::debug!(cookie = parsed.name(), %err, "dropping undecodable macaroon cookie"),
            }
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_macaroon() -> Macaroon {
        let mut m = Macaroon::new(b"root", "id-1", Some("https://target.example".into()));
        m.add_first_party_caveat(time_before_caveat(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        m
    }

    #[test]
    fn slice_round_trips_through_base64_json() {
        let slice = vec![sample_macaroon()];
        let encoded = encode_slice(&slice).unwrap();
        let decoded = decode_slice(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].signature(), slice[0].signature());
    }

    #[test]
    fn decoding_independent_of_cookie_name_suffix() {
        let slice = vec![sample_macaroon()];
        let encoded = encode_slice(&slice).unwrap();

        let name_a = cookie_name(Some("auth"), &slice[0]);
        let name_b = cookie_name(None, &slice[0]);
        assert_ne!(name_a, name_b);

        // Whatever the suffix, the decoded structure is identical.
        assert_eq!(decode_slice(&encoded).unwrap()[0].signature(), slice[0].signature());
    }

    #[test]
    fn slice_expiry_picks_minimum_time_before() {
        let mut a = Macaroon::new(b"k", "a", None);
        a.add_first_party_caveat(time_before_caveat(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()));
        let mut b = Macaroon::new(b"k", "b", None);
        b.add_first_party_caveat(time_before_caveat(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));

        let expiry = slice_expiry(&[a, b]).unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn slice_without_time_before_has_no_expiry() {
        let m = Macaroon::new(b"k", "a", None);
        assert_eq!(slice_expiry(&[m]), None);
    }

    #[test]
    fn request_macaroon_slices_collects_headers_and_cookies() {
        let slice = vec![sample_macaroon()];
        let encoded = encode_slice(&slice).unwrap();
        let cookie_header = format!("macaroon-auth={encoded}; unrelated=1");

        let slices = request_macaroon_slices(&[encoded.as_str()], Some(&cookie_header));
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn garbage_cookie_values_are_skipped_not_fatal() {
        let slices = request_macaroon_slices(&[], Some("macaroon-x=not-valid-base64!!"));
        assert!(slices.is_empty());
    }
}

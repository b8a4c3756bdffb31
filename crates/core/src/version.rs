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

use serde::{Deserialize, Serialize};

/// The client's declared protocol generation, carried by the
/// `Bakery-Protocol-Version` request header and echoed back into every
/// [`crate::Error`] response so the HTTP status matches what the client
/// understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BakeryVersion(pub u8);

impl BakeryVersion {
    pub const LEGACY: Self = Self(0);
    pub const LATEST: Self = Self(1);

    pub const HEADER_NAME: &'static str = "Bakery-Protocol-Version";

    /// Parse a header value, falling back to [`Self::LEGACY`] for anything
    /// missing, malformed, or above [`Self::LATEST`].
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.and_then(|s| s.parse::<u8>().ok()) {
            Some(v) if v <= Self::LATEST.0 => Self(v),
            _ => Self::LEGACY,
        }
    }

    #[must_use]
    pub fn is_legacy(self) -> bool {
        self == Self::LEGACY
    }
}

impl Default for BakeryVersion {
    fn default() -> Self {
        Self::LEGACY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_to_legacy() {
        assert_eq!(BakeryVersion::parse(None), BakeryVersion::LEGACY);
        assert_eq!(BakeryVersion::parse(Some("not a number")), BakeryVersion::LEGACY);
        assert_eq!(BakeryVersion::parse(Some("99")), BakeryVersion::LEGACY);
    }

    #[test]
    fn parse_accepts_known_versions() {
        assert_eq!(BakeryVersion::parse(Some("0")), BakeryVersion::LEGACY);
        assert_eq!(BakeryVersion::parse(Some("1")), BakeryVersion::LATEST);
    }
}

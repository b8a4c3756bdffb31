//! Serde helper for byte fields that should travel as URL-safe, unpadded
//! base64 on the wire (matching the `id64`/`caveat64` encoding used
//! throughout the HTTP discharge protocol).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    URL_SAFE_NO_PAD.encode(bytes).serialize(s)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
}

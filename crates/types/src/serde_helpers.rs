//! Wire-format helpers for values the execution engine may encode either as
//! JSON strings or as JSON numbers.

use cosmwasm_std::Uint128;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::str::FromStr;

/// Serialize a `Uint128` as a decimal string; accept a decimal string or an
/// unsigned JSON integer on the way in.
pub mod flexible_uint128 {
    use super::*;

    pub fn serialize<S>(value: &Uint128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uint128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(Uint128Visitor)
    }
}

struct Uint128Visitor;

impl<'de> Visitor<'de> for Uint128Visitor {
    type Value = Uint128;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Uint128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(Uint128::new(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(Uint128::from)
            .map_err(|_| E::custom(format!("negative amount: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Uint128::from_str(v.trim()).map_err(|e| E::custom(format!("invalid amount '{v}': {e}")))
    }
}

/// Accept a lowercase/uppercase hex string (optionally `0x` prefixed) or a
/// sequence of byte integers, always yielding lowercase hex without prefix.
pub(crate) struct HexOrBytesVisitor;

impl<'de> Visitor<'de> for HexOrBytesVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a hex string or an array of bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let stripped = v.strip_prefix("0x").unwrap_or(v);
        hex::decode(stripped).map_err(|e| E::custom(format!("invalid hex '{v}': {e}")))?;
        Ok(stripped.to_ascii_lowercase())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(32));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(hex::encode(bytes))
    }
}

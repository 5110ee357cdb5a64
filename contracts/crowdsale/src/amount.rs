//! Serde helpers for `u128` token and quote-currency amounts.
//!
//! Amounts are written as decimal strings so that values above `u64::MAX`
//! (anything past ~18.4 whole tokens at 18 decimals) survive JSON clients.
//! Reading accepts either a decimal string or a plain integer.

use core::fmt;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

use crate::types::Amount;

pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer amount or its decimal string form")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("negative amount: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.trim()
            .parse::<Amount>()
            .map_err(|_| E::custom(format!("invalid amount: {v:?}")))
    }
}

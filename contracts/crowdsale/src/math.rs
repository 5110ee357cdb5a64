//! Fixed-point pricing.
//!
//! A phase price is the number of quote base units paid for one *whole*
//! token, i.e. for `10^decimals` token base units. The cost of a fill is
//!
//! ```text
//! cost = floor(amount * price / 10^decimals)
//! ```
//!
//! The product is formed in 256 bits so it can never wrap, and the quotient
//! is rounded toward zero. Rounding is applied per fill: a purchase spanning
//! two phases is billed `floor(a1 * p1 / s) + floor(a2 * p2 / s)`, which is
//! also exactly what each phase's `raised` counter records. Reconciliation
//! against the quote-currency ledger must use the same per-fill rule.

use ethnum::U256;

use crate::types::Amount;
use crate::{Error, Result};

/// Largest supported token precision; `10^38` is the largest power of ten in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

/// `10^decimals` as a `u128`.
pub fn scale(decimals: u8) -> Result<Amount> {
    if decimals > MAX_DECIMALS {
        return Err(Error::InvalidConfig);
    }
    10u128.checked_pow(u32::from(decimals)).ok_or(Error::Overflow)
}

/// Quote-currency cost of `amount` token base units at `price`.
pub fn cost_of(amount: Amount, price: Amount, decimals: u8) -> Result<Amount> {
    let scale = U256::new(scale(decimals)?);
    let product = U256::new(amount)
        .checked_mul(U256::new(price))
        .ok_or(Error::Overflow)?;
    let quotient = product.checked_div(scale).ok_or(Error::Overflow)?;

    let (high, low) = quotient.into_words();
    if high != 0 {
        return Err(Error::Overflow);
    }
    Ok(low)
}

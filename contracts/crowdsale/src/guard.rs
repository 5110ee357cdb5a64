//! Request validation that runs before any phase-level work.

use crate::types::{Amount, SaleState};
use crate::{Error, Result};

/// Check a purchase request against the global constraints, in order:
/// sale started, non-zero amount, minimum purchase, remaining ICO supply.
///
/// Pure: reads `sale`, never writes it.
pub fn validate(amount: Amount, sale: &SaleState, ico_supply: Amount) -> Result<()> {
    if !sale.started {
        return Err(Error::SaleNotStarted);
    }
    if amount == 0 {
        return Err(Error::InvalidAmount);
    }
    if amount < sale.min_purchase {
        return Err(Error::MinCap);
    }

    let after = sale
        .total_sold
        .checked_add(amount)
        .ok_or(Error::ExceedIcoSupply)?;
    if after > ico_supply {
        return Err(Error::ExceedIcoSupply);
    }
    Ok(())
}

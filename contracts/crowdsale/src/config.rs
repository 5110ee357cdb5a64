//! Sale configuration.
//!
//! A [`SaleConfig`] is the only input needed to build a [`crate::Sale`]. It is
//! plain data so it can be loaded from JSON by the service or written inline
//! by tests.

use serde::{Deserialize, Serialize};

use crate::math::{self, MAX_DECIMALS};
use crate::types::Amount;
use crate::{Error, Result};

/// 48 hours.
pub const DEFAULT_PHASE_DURATION: u64 = 48 * 60 * 60;

pub const DEFAULT_DECIMALS: u8 = 18;

const E18: Amount = 1_000_000_000_000_000_000;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Quote base units per whole token.
    #[serde(with = "crate::amount")]
    pub price: Amount,
    /// Token base units.
    #[serde(with = "crate::amount")]
    pub supply_cap: Amount,
    /// Seconds.
    pub duration: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Only this principal may start the sale.
    pub owner: String,
    /// Receives every quote-currency payment.
    pub fund_recipient: String,
    /// Shared precision of the sale token and the quote currency.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Global floor per purchase, token base units.
    #[serde(with = "crate::amount")]
    pub min_purchase: Amount,
    pub phases: Vec<PhaseConfig>,
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

impl Default for SaleConfig {
    /// Two 48h phases: 40M tokens at 0.0013 and 10M tokens at 0.0026,
    /// 1 000 token minimum.
    fn default() -> Self {
        Self {
            owner: "owner".to_string(),
            fund_recipient: "treasury".to_string(),
            decimals: DEFAULT_DECIMALS,
            min_purchase: 1_000 * E18,
            phases: vec![
                PhaseConfig {
                    price: 1_300_000_000_000_000,
                    supply_cap: 40_000_000 * E18,
                    duration: DEFAULT_PHASE_DURATION,
                },
                PhaseConfig {
                    price: 2_600_000_000_000_000,
                    supply_cap: 10_000_000 * E18,
                    duration: DEFAULT_PHASE_DURATION,
                },
            ],
        }
    }
}

impl SaleConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.decimals > MAX_DECIMALS {
            return Err(Error::InvalidConfig);
        }
        if self.owner.is_empty() || self.fund_recipient.is_empty() {
            return Err(Error::InvalidConfig);
        }
        if self.phases.is_empty() || self.phases.len() > u32::MAX as usize {
            return Err(Error::InvalidConfig);
        }

        let mut supply: Amount = 0;
        for phase in &self.phases {
            if phase.price == 0 || phase.supply_cap == 0 || phase.duration == 0 {
                return Err(Error::InvalidConfig);
            }
            supply = supply
                .checked_add(phase.supply_cap)
                .ok_or(Error::InvalidConfig)?;
        }

        // Selling out every phase must keep `total_raised` within `u128`.
        let mut raised: Amount = 0;
        for phase in &self.phases {
            let cost = math::cost_of(phase.supply_cap, phase.price, self.decimals)
                .map_err(|_| Error::InvalidConfig)?;
            raised = raised.checked_add(cost).ok_or(Error::InvalidConfig)?;
        }
        Ok(())
    }
}

//! Ordered, read-only phase configuration.

use crate::config::SaleConfig;
use crate::types::{Amount, Phase, PhaseIndex};
use crate::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhaseTable {
    phases: Vec<Phase>,
    ico_supply: Amount,
}

impl PhaseTable {
    /// Build the table from a validated configuration; indices are assigned
    /// 1..=n in configuration order.
    pub fn from_config(config: &SaleConfig) -> Result<Self> {
        config.validate()?;

        let mut phases = Vec::with_capacity(config.phases.len());
        let mut ico_supply: Amount = 0;
        for (index, phase) in (1..).zip(config.phases.iter()) {
            ico_supply = ico_supply
                .checked_add(phase.supply_cap)
                .ok_or(Error::InvalidConfig)?;
            phases.push(Phase {
                index,
                price: phase.price,
                supply_cap: phase.supply_cap,
                duration: phase.duration,
            });
        }

        Ok(Self { phases, ico_supply })
    }

    pub fn get(&self, index: PhaseIndex) -> Result<&Phase> {
        index
            .checked_sub(1)
            .and_then(|i| self.phases.get(i as usize))
            .ok_or(Error::UnknownPhase)
    }

    pub fn count(&self) -> PhaseIndex {
        self.phases.len() as PhaseIndex
    }

    /// Sum of every phase's supply cap: the hard ceiling on tokens sold.
    pub fn ico_supply(&self) -> Amount {
        self.ico_supply
    }

    pub fn contains(&self, index: PhaseIndex) -> bool {
        index >= 1 && index <= self.count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }
}

//! Per-phase and sale-wide running totals.
//!
//! The [`AccountingLedger`] is the single owned aggregate holding every
//! mutable number of the sale. Numeric fields change only through
//! [`AccountingLedger::record_sale`]; the phase pointer and lifecycle fields
//! change only through the activation helpers used by the phase advancer.

use serde::{Deserialize, Serialize};

use crate::phases::PhaseTable;
use crate::types::{Amount, PhaseDetails, PhaseIndex, PhaseState, PhaseStatus, SaleState, Timestamp};
use crate::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountingLedger {
    sale: SaleState,
    phases: Vec<PhaseState>,
    /// Bumped on every commit; lets a staged plan detect that it went stale.
    revision: u64,
}

impl AccountingLedger {
    pub fn new(phase_count: PhaseIndex, min_purchase: Amount) -> Self {
        Self {
            sale: SaleState {
                active_phase: 1,
                total_sold: 0,
                total_raised: 0,
                started: false,
                min_purchase,
            },
            phases: vec![PhaseState::default(); phase_count as usize],
            revision: 0,
        }
    }

    /// Rebuild a ledger from persisted parts, checking every invariant
    /// against `table`.
    pub fn from_parts(
        table: &PhaseTable,
        sale: SaleState,
        phases: Vec<PhaseState>,
        revision: u64,
    ) -> Result<Self> {
        let ledger = Self {
            sale,
            phases,
            revision,
        };
        ledger.check_invariants(table)?;
        Ok(ledger)
    }

    pub fn sale(&self) -> &SaleState {
        &self.sale
    }

    pub fn phase_states(&self) -> &[PhaseState] {
        &self.phases
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn phase(&self, index: PhaseIndex) -> Result<&PhaseState> {
        index
            .checked_sub(1)
            .and_then(|i| self.phases.get(i as usize))
            .ok_or(Error::UnknownPhase)
    }

    fn phase_mut(&mut self, index: PhaseIndex) -> Result<&mut PhaseState> {
        index
            .checked_sub(1)
            .and_then(|i| self.phases.get_mut(i as usize))
            .ok_or(Error::UnknownPhase)
    }

    /// Add a fill of `amount` tokens costing `cost` to phase `index` and to
    /// the sale totals. Either every counter moves or none does.
    pub fn record_sale(
        &mut self,
        table: &PhaseTable,
        index: PhaseIndex,
        amount: Amount,
        cost: Amount,
    ) -> Result<()> {
        let cap = table.get(index)?.supply_cap;
        let state = self.phase(index)?;
        if state.status != PhaseStatus::Active {
            return Err(Error::SaleEnded);
        }

        let sold = state.sold.checked_add(amount).ok_or(Error::Overflow)?;
        if sold > cap {
            return Err(Error::ExceedIcoSupply);
        }
        let raised = state.raised.checked_add(cost).ok_or(Error::Overflow)?;
        let total_sold = self
            .sale
            .total_sold
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let total_raised = self
            .sale
            .total_raised
            .checked_add(cost)
            .ok_or(Error::Overflow)?;

        let state = self.phase_mut(index)?;
        state.sold = sold;
        state.raised = raised;
        self.sale.total_sold = total_sold;
        self.sale.total_raised = total_raised;
        Ok(())
    }

    /// `(raised, sold, price)` plus the sale-wide raised total.
    pub fn details(&self, table: &PhaseTable, index: PhaseIndex) -> Result<PhaseDetails> {
        let phase = table.get(index)?;
        let state = self.phase(index)?;
        Ok(PhaseDetails {
            index,
            raised: state.raised,
            sold: state.sold,
            price: phase.price,
            total_raised: self.sale.total_raised,
            supply_cap: phase.supply_cap,
            status: state.status,
            started_at: state.started_at,
        })
    }

    /// Mark the sale started with phase 1 active from `now`.
    pub(crate) fn open(&mut self, now: Timestamp) -> Result<()> {
        if self.sale.started {
            return Err(Error::AlreadyStarted);
        }
        let first = self.phase_mut(1)?;
        first.status = PhaseStatus::Active;
        first.started_at = Some(now);
        self.sale.active_phase = 1;
        self.sale.started = true;
        Ok(())
    }

    /// Close the active phase and activate `next` from `now`.
    pub(crate) fn rotate(&mut self, next: PhaseIndex, now: Timestamp) -> Result<()> {
        let current = self.sale.active_phase;
        if next <= current {
            return Err(Error::UnknownPhase);
        }
        // Resolve both before touching either so a bad index changes nothing.
        self.phase(current)?;
        self.phase(next)?;

        self.phase_mut(current)?.status = PhaseStatus::Closed;
        let state = self.phase_mut(next)?;
        state.status = PhaseStatus::Active;
        state.started_at = Some(now);
        self.sale.active_phase = next;
        Ok(())
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Verify the accounting invariants against the phase table.
    pub fn check_invariants(&self, table: &PhaseTable) -> Result<()> {
        if self.phases.len() != table.count() as usize {
            return Err(Error::InvalidConfig);
        }

        let mut sold: Amount = 0;
        let mut raised: Amount = 0;
        for (phase, state) in table.iter().zip(self.phases.iter()) {
            if state.sold > phase.supply_cap {
                return Err(Error::ExceedIcoSupply);
            }
            let expected = match phase.index.cmp(&self.sale.active_phase) {
                std::cmp::Ordering::Less => PhaseStatus::Closed,
                std::cmp::Ordering::Equal if self.sale.started => PhaseStatus::Active,
                _ => PhaseStatus::Pending,
            };
            if state.status != expected {
                return Err(Error::InvalidConfig);
            }
            sold = sold.checked_add(state.sold).ok_or(Error::Overflow)?;
            raised = raised.checked_add(state.raised).ok_or(Error::Overflow)?;
        }

        if sold != self.sale.total_sold || raised != self.sale.total_raised {
            return Err(Error::InvalidConfig);
        }
        if self.sale.total_sold > table.ico_supply() {
            return Err(Error::ExceedIcoSupply);
        }
        Ok(())
    }
}

//! Active-phase evaluation.
//!
//! Every evaluation checks the active phase in this order:
//!
//! 1. `sold == supply_cap`: the phase closes and the next one opens at `now`.
//! 2. `now - started_at >= duration`: the phase closes even with supply
//!    left; the remainder is forfeited, never carried forward.
//! 3. Otherwise the phase stays active.
//!
//! At most one step is taken per evaluation. A phase opened at `now` cannot
//! have expired at `now`, so a single step always lands on a usable phase
//! unless that phase is also sold out, which only happens mid-rollover.

use tracing::info;

use crate::ledger::AccountingLedger;
use crate::phases::PhaseTable;
use crate::types::{AdvanceReason, PhaseIndex, PhaseTransition, Timestamp};
use crate::{Error, Result};

pub struct PhaseAdvancer<'a> {
    table: &'a PhaseTable,
}

impl<'a> PhaseAdvancer<'a> {
    pub fn new(table: &'a PhaseTable) -> Self {
        Self { table }
    }

    /// Why the active phase must roll forward at `now`, if it must.
    pub fn pending_advance(
        &self,
        ledger: &AccountingLedger,
        now: Timestamp,
    ) -> Result<Option<AdvanceReason>> {
        let sale = ledger.sale();
        if !sale.started {
            return Err(Error::SaleNotStarted);
        }

        let phase = self.table.get(sale.active_phase)?;
        let state = ledger.phase(sale.active_phase)?;
        let started_at = state.started_at.ok_or(Error::SaleNotStarted)?;

        if state.sold >= phase.supply_cap {
            Ok(Some(AdvanceReason::SoldOut))
        } else if now.saturating_sub(started_at) >= phase.duration {
            Ok(Some(AdvanceReason::Expired))
        } else {
            Ok(None)
        }
    }

    /// The phase a purchase at `now` lands in, applying at most one
    /// transition to `ledger`.
    ///
    /// Fails with `SaleEnded` when a transition is required but the active
    /// phase is the last configured one; `ledger` is untouched in that case.
    pub fn current_phase(
        &self,
        ledger: &mut AccountingLedger,
        now: Timestamp,
    ) -> Result<(PhaseIndex, Option<PhaseTransition>)> {
        match self.pending_advance(ledger, now)? {
            None => Ok((ledger.sale().active_phase, None)),
            Some(reason) => {
                let transition = self.advance(ledger, reason, now)?;
                Ok((transition.to, Some(transition)))
            }
        }
    }

    /// Non-mutating variant of [`Self::current_phase`].
    pub fn peek(&self, ledger: &AccountingLedger, now: Timestamp) -> Result<PhaseIndex> {
        let active = ledger.sale().active_phase;
        match self.pending_advance(ledger, now)? {
            None => Ok(active),
            Some(_) if self.table.contains(active + 1) => Ok(active + 1),
            Some(_) => Err(Error::SaleEnded),
        }
    }

    fn advance(
        &self,
        ledger: &mut AccountingLedger,
        reason: AdvanceReason,
        now: Timestamp,
    ) -> Result<PhaseTransition> {
        let from = ledger.sale().active_phase;
        let to = from.checked_add(1).ok_or(Error::SaleEnded)?;
        if !self.table.contains(to) {
            return Err(Error::SaleEnded);
        }

        let cap = self.table.get(from)?.supply_cap;
        let forfeited = cap.saturating_sub(ledger.phase(from)?.sold);

        ledger.rotate(to, now)?;
        info!(from, to, ?reason, forfeited = %forfeited, "sale phase advanced");

        Ok(PhaseTransition {
            from,
            to,
            reason,
            at: now,
            forfeited,
        })
    }
}

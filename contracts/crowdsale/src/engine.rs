//! The rollover loop.
//!
//! A purchase is planned against a private copy of the ledger. The loop fills
//! the active phase up to its remaining cap, rolls forward, and repeats until
//! the whole request is allocated. Only a plan that satisfies the full amount
//! is ever returned, and the live ledger is replaced by the plan's staged copy
//! in one step at commit time.

use tracing::debug;

use crate::advancer::PhaseAdvancer;
use crate::guard;
use crate::ledger::AccountingLedger;
use crate::math;
use crate::phases::PhaseTable;
use crate::types::{Amount, Fill, PhaseTransition, Timestamp};
use crate::{Error, Result};

/// A fully allocated purchase, not yet applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PurchasePlan {
    amount: Amount,
    total_cost: Amount,
    fills: Vec<Fill>,
    transitions: Vec<PhaseTransition>,
    evaluated_at: Timestamp,
    base_revision: u64,
    staged: AccountingLedger,
}

impl PurchasePlan {
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Sum of per-fill costs, each rounded toward zero.
    pub fn total_cost(&self) -> Amount {
        self.total_cost
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn evaluated_at(&self) -> Timestamp {
        self.evaluated_at
    }

    /// Revision of the ledger this plan was computed from.
    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    /// The ledger as it will look once this plan is committed.
    pub fn staged(&self) -> &AccountingLedger {
        &self.staged
    }

    pub(crate) fn into_staged(self) -> AccountingLedger {
        self.staged
    }
}

pub struct PurchaseEngine<'a> {
    table: &'a PhaseTable,
    decimals: u8,
}

impl<'a> PurchaseEngine<'a> {
    pub fn new(table: &'a PhaseTable, decimals: u8) -> Self {
        Self { table, decimals }
    }

    /// Validate and allocate `amount` tokens at `now` without touching `ledger`.
    pub fn plan(
        &self,
        ledger: &AccountingLedger,
        amount: Amount,
        now: Timestamp,
    ) -> Result<PurchasePlan> {
        guard::validate(amount, ledger.sale(), self.table.ico_supply())?;

        let advancer = PhaseAdvancer::new(self.table);
        let mut staged = ledger.clone();
        let mut fills = Vec::new();
        let mut transitions = Vec::new();
        let mut remaining = amount;
        let mut total_cost: Amount = 0;

        loop {
            let (index, transition) = match advancer.current_phase(&mut staged, now) {
                Ok(step) => step,
                // Running out of phases after part of the request was placed
                // means the request cannot be satisfied as a whole.
                Err(Error::SaleEnded) if !fills.is_empty() => {
                    return Err(Error::ExceedIcoSupply);
                }
                Err(e) => return Err(e),
            };
            transitions.extend(transition);

            let phase = self.table.get(index)?;
            let available = phase.supply_cap.saturating_sub(staged.phase(index)?.sold);
            let fill = remaining.min(available);
            if fill == 0 {
                // Only reachable when the newly opened phase is itself full,
                // which the ledger invariants rule out; fail rather than spin.
                return Err(Error::ExceedIcoSupply);
            }

            let cost = math::cost_of(fill, phase.price, self.decimals)?;
            staged.record_sale(self.table, index, fill, cost)?;
            total_cost = total_cost.checked_add(cost).ok_or(Error::Overflow)?;
            remaining -= fill;

            debug!(
                phase = index,
                fill = %fill,
                cost = %cost,
                remaining = %remaining,
                "allocated purchase slice"
            );
            fills.push(Fill {
                phase: index,
                amount: fill,
                price: phase.price,
                cost,
            });

            if remaining == 0 {
                break;
            }
        }

        Ok(PurchasePlan {
            amount,
            total_cost,
            fills,
            transitions,
            evaluated_at: now,
            base_revision: ledger.revision(),
            staged,
        })
    }
}

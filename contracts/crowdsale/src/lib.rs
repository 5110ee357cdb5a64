//! # Phased Crowdsale Engine
//!
//! Sells a fixed-supply token in sequential pricing phases against a single
//! quote currency. Each phase has its own price, supply cap and time window;
//! a purchase that outruns the active phase rolls over into the next one and
//! is billed per phase.
//!
//! | Stage       | Entry Point(s)                                   |
//! |-------------|--------------------------------------------------|
//! | Bootstrap   | [`Sale::new`], [`Sale::restore`]                 |
//! | Owner       | [`Sale::start_crowdsale`]                        |
//! | Purchasing  | [`Sale::purchase`], [`Sale::quote`] + [`Sale::commit`] |
//! | Queries     | `get_phase_details`, `active_phase`, `summary`   |
//!
//! ## Architecture
//!
//! Configuration lives in [`phases::PhaseTable`]; every mutable number lives
//! in [`ledger::AccountingLedger`]. [`guard`] validates requests,
//! [`advancer::PhaseAdvancer`] moves the active-phase pointer and
//! [`engine::PurchaseEngine`] runs the rollover loop against a staged copy of
//! the ledger. This file holds the entry points and event emission only.
//!
//! All mutation goes through `&mut Sale`, so a caller that shares a sale
//! between threads must serialize access (the service wraps it in a mutex).

pub mod advancer;
pub mod amount;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod math;
pub mod phases;
pub mod settlement;
pub mod types;

#[cfg(test)]
mod test_events;
#[cfg(test)]
mod test_expire;
#[cfg(test)]
mod test_purchase;
#[cfg(test)]
mod test_utils;

use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PhaseConfig, SaleConfig};
pub use engine::PurchasePlan;
pub use events::SaleEvent;
use ledger::AccountingLedger;
use phases::PhaseTable;
pub use settlement::{Settlement, SettlementError, TokenBook};
pub use types::{
    AdvanceReason, Amount, Fill, Phase, PhaseDetails, PhaseIndex, PhaseState, PhaseStatus,
    PhaseTransition, PurchaseReceipt, SaleState, SaleSummary, Timestamp,
};

#[derive(thiserror::Error, Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    #[error("sale has not started")]
    SaleNotStarted = 1,
    #[error("sale already started")]
    AlreadyStarted = 2,
    #[error("purchase is below the minimum amount")]
    MinCap = 3,
    #[error("purchase exceeds the remaining ICO supply")]
    ExceedIcoSupply = 4,
    #[error("unknown phase")]
    UnknownPhase = 5,
    #[error("no further phase to advance into")]
    SaleEnded = 6,
    #[error("payment failed")]
    PaymentFailed = 7,
    #[error("token issuance failed")]
    IssuanceFailed = 8,
    #[error("amount must be greater than zero")]
    InvalidAmount = 9,
    #[error("invalid sale configuration")]
    InvalidConfig = 10,
    #[error("caller is not the sale owner")]
    NotAuthorized = 11,
    #[error("arithmetic overflow")]
    Overflow = 12,
    #[error("purchase plan is stale")]
    StalePlan = 13,
}

impl Error {
    pub fn code(self) -> u32 {
        self as u32
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct Sale {
    config: SaleConfig,
    table: PhaseTable,
    ledger: AccountingLedger,
    clock: Arc<dyn Clock>,
    events: Vec<SaleEvent>,
}

impl fmt::Debug for Sale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sale")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("events", &self.events.len())
            .finish()
    }
}

impl Sale {
    // ─────────────────────────────────────────────────────────
    // Bootstrap
    // ─────────────────────────────────────────────────────────

    /// Build a fresh, not yet started sale.
    pub fn new(config: SaleConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let table = PhaseTable::from_config(&config)?;
        let ledger = AccountingLedger::new(table.count(), config.min_purchase);
        Ok(Self {
            config,
            table,
            ledger,
            clock,
            events: Vec::new(),
        })
    }

    /// Rebuild a sale from persisted ledger parts.
    ///
    /// `min_purchase` always comes from `config`, not from the stored state.
    pub fn restore(
        config: SaleConfig,
        clock: Arc<dyn Clock>,
        mut sale: SaleState,
        phases: Vec<PhaseState>,
        revision: u64,
    ) -> Result<Self> {
        let table = PhaseTable::from_config(&config)?;
        sale.min_purchase = config.min_purchase;
        let ledger = AccountingLedger::from_parts(&table, sale, phases, revision)?;
        Ok(Self {
            config,
            table,
            ledger,
            clock,
            events: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────
    // Owner
    // ─────────────────────────────────────────────────────────

    /// Open phase 1 at the current time. One-shot; owner only.
    pub fn start_crowdsale(&mut self, caller: &str) -> Result<()> {
        if caller != self.config.owner {
            return Err(Error::NotAuthorized);
        }
        let now = self.clock.now();
        self.ledger.open(now)?;
        self.ledger.bump_revision();
        events::emit_sale_started(&mut self.events, caller.to_string(), now);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Purchasing
    // ─────────────────────────────────────────────────────────

    /// Price and allocate `amount` at the current time without changing state.
    pub fn quote(&self, amount: Amount) -> Result<PurchasePlan> {
        self.quote_at(amount, self.clock.now())
    }

    pub fn quote_at(&self, amount: Amount, now: Timestamp) -> Result<PurchasePlan> {
        engine::PurchaseEngine::new(&self.table, self.config.decimals).plan(
            &self.ledger,
            amount,
            now,
        )
    }

    /// Apply a plan produced by [`Sale::quote`] for `buyer`.
    ///
    /// Fails with `StalePlan` if anything was committed since the plan was made.
    pub fn commit(&mut self, buyer: &str, plan: PurchasePlan) -> Result<PurchaseReceipt> {
        if plan.base_revision() != self.ledger.revision() {
            return Err(Error::StalePlan);
        }

        let amount = plan.amount();
        let total_cost = plan.total_cost();
        let at = plan.evaluated_at();
        let fills = plan.fills().to_vec();
        let transitions = plan.transitions().to_vec();

        self.ledger = plan.into_staged();
        self.ledger.bump_revision();

        for transition in &transitions {
            events::emit_phase_advanced(&mut self.events, *transition);
        }
        events::emit_tokens_purchased(
            &mut self.events,
            buyer.to_string(),
            amount,
            total_cost,
            fills.clone(),
            at,
        );

        Ok(PurchaseReceipt {
            buyer: buyer.to_string(),
            amount,
            total_cost,
            fills,
            transitions,
            at,
            revision: self.ledger.revision(),
        })
    }

    /// Buy `amount` tokens for `buyer`: plan, collect payment, deliver
    /// tokens, then commit. Any failure leaves the sale unchanged.
    pub fn purchase<S>(
        &mut self,
        buyer: &str,
        amount: Amount,
        settlement: &mut S,
    ) -> Result<PurchaseReceipt>
    where
        S: Settlement + ?Sized,
    {
        let plan = self.quote(amount)?;
        let cost = plan.total_cost();
        let recipient = self.config.fund_recipient.as_str();

        if let Err(e) = settlement.collect_payment(buyer, recipient, cost) {
            warn!(%buyer, cost = %cost, error = %e, "payment collection failed");
            return Err(Error::PaymentFailed);
        }

        if let Err(e) = settlement.issue_tokens(buyer, amount) {
            warn!(%buyer, amount = %amount, error = %e, "token issuance failed, refunding");
            if let Err(refund) = settlement.refund_payment(buyer, recipient, cost) {
                error!(%buyer, cost = %cost, error = %refund, "refund after failed issuance failed");
            }
            return Err(Error::IssuanceFailed);
        }

        self.commit(buyer, plan)
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    /// `(raised, sold, price, total_raised)` for phase `index`, plus its
    /// cap and lifecycle status.
    pub fn get_phase_details(&self, index: PhaseIndex) -> Result<PhaseDetails> {
        self.ledger.details(&self.table, index)
    }

    /// The phase a purchase made now would start in. Never mutates.
    pub fn active_phase(&self) -> Result<PhaseIndex> {
        self.active_phase_at(self.clock.now())
    }

    pub fn active_phase_at(&self, now: Timestamp) -> Result<PhaseIndex> {
        advancer::PhaseAdvancer::new(&self.table).peek(&self.ledger, now)
    }

    pub fn summary(&self) -> SaleSummary {
        let sale = self.ledger.sale();
        let ico_supply = self.table.ico_supply();
        SaleSummary {
            started: sale.started,
            active_phase: sale.active_phase,
            phase_count: self.table.count(),
            total_sold: sale.total_sold,
            total_raised: sale.total_raised,
            ico_supply,
            remaining_supply: ico_supply.saturating_sub(sale.total_sold),
            min_purchase: sale.min_purchase,
        }
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn phase_table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn ledger(&self) -> &AccountingLedger {
        &self.ledger
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Events emitted since the last [`Sale::drain_events`].
    pub fn events(&self) -> &[SaleEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SaleEvent> {
        std::mem::take(&mut self.events)
    }
}

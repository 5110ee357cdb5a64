use serde::{Deserialize, Serialize};

/// Token or quote-currency amount in base units.
pub type Amount = u128;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// 1-based phase ordinal; configuration order is sale order.
pub type PhaseIndex = u32;

/// One configured pricing window. Immutable once the table is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub index: PhaseIndex,
    /// Quote base units per whole token.
    #[serde(with = "crate::amount")]
    pub price: Amount,
    /// Token base units sellable in this phase.
    #[serde(with = "crate::amount")]
    pub supply_cap: Amount,
    /// Window length in seconds, measured from activation.
    pub duration: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Active,
    Closed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Active => "active",
            PhaseStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PhaseStatus::Pending),
            "active" => Some(PhaseStatus::Active),
            "closed" => Some(PhaseStatus::Closed),
            _ => None,
        }
    }
}

/// Mutable running totals for one phase. Never removed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    #[serde(with = "crate::amount")]
    pub sold: Amount,
    #[serde(with = "crate::amount")]
    pub raised: Amount,
    pub started_at: Option<Timestamp>,
    pub status: PhaseStatus,
}

impl PhaseState {
    pub fn is_closed(&self) -> bool {
        self.status == PhaseStatus::Closed
    }
}

/// Sale-wide aggregate.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleState {
    pub active_phase: PhaseIndex,
    #[serde(with = "crate::amount")]
    pub total_sold: Amount,
    #[serde(with = "crate::amount")]
    pub total_raised: Amount,
    pub started: bool,
    #[serde(with = "crate::amount")]
    pub min_purchase: Amount,
}

/// Why the active phase rolled forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    SoldOut,
    Expired,
}

/// A single `Active -> Closed` / `Pending -> Active` step.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: PhaseIndex,
    pub to: PhaseIndex,
    pub reason: AdvanceReason,
    pub at: Timestamp,
    /// Capacity left behind in `from`; zero unless the phase expired.
    #[serde(with = "crate::amount")]
    pub forfeited: Amount,
}

/// The part of a purchase allocated to one phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub phase: PhaseIndex,
    #[serde(with = "crate::amount")]
    pub amount: Amount,
    #[serde(with = "crate::amount")]
    pub price: Amount,
    #[serde(with = "crate::amount")]
    pub cost: Amount,
}

/// Read-only snapshot returned by `get_phase_details`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseDetails {
    pub index: PhaseIndex,
    #[serde(with = "crate::amount")]
    pub raised: Amount,
    #[serde(with = "crate::amount")]
    pub sold: Amount,
    #[serde(with = "crate::amount")]
    pub price: Amount,
    /// Sale-wide quote currency raised at the time of the read.
    #[serde(with = "crate::amount")]
    pub total_raised: Amount,
    #[serde(with = "crate::amount")]
    pub supply_cap: Amount,
    pub status: PhaseStatus,
    pub started_at: Option<Timestamp>,
}

impl PhaseDetails {
    /// `(raised, sold, price, total_raised)`.
    pub fn as_tuple(&self) -> (Amount, Amount, Amount, Amount) {
        (self.raised, self.sold, self.price, self.total_raised)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleSummary {
    pub started: bool,
    pub active_phase: PhaseIndex,
    pub phase_count: PhaseIndex,
    #[serde(with = "crate::amount")]
    pub total_sold: Amount,
    #[serde(with = "crate::amount")]
    pub total_raised: Amount,
    #[serde(with = "crate::amount")]
    pub ico_supply: Amount,
    #[serde(with = "crate::amount")]
    pub remaining_supply: Amount,
    #[serde(with = "crate::amount")]
    pub min_purchase: Amount,
}

/// Outcome of a committed purchase.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub buyer: String,
    #[serde(with = "crate::amount")]
    pub amount: Amount,
    #[serde(with = "crate::amount")]
    pub total_cost: Amount,
    pub fills: Vec<Fill>,
    pub transitions: Vec<PhaseTransition>,
    pub at: Timestamp,
    /// Ledger revision produced by this purchase.
    pub revision: u64,
}

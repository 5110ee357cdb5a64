use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Amount, Fill, PhaseIndex, PhaseTransition, Timestamp};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleStarted {
    pub owner: String,
    pub phase: PhaseIndex,
    pub at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhaseAdvanced {
    pub transition: PhaseTransition,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokensPurchased {
    pub buyer: String,
    #[serde(with = "crate::amount")]
    pub amount: Amount,
    #[serde(with = "crate::amount")]
    pub cost: Amount,
    pub fills: Vec<Fill>,
    pub at: Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleEvent {
    Started(SaleStarted),
    Advanced(PhaseAdvanced),
    Purchased(TokensPurchased),
}

impl SaleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SaleEvent::Started(_) => "started",
            SaleEvent::Advanced(_) => "advanced",
            SaleEvent::Purchased(_) => "purchased",
        }
    }

    pub fn at(&self) -> Timestamp {
        match self {
            SaleEvent::Started(e) => e.at,
            SaleEvent::Advanced(e) => e.transition.at,
            SaleEvent::Purchased(e) => e.at,
        }
    }
}

pub fn emit_sale_started(log: &mut Vec<SaleEvent>, owner: String, at: Timestamp) {
    info!(%owner, at, "crowdsale started");
    log.push(SaleEvent::Started(SaleStarted {
        owner,
        phase: 1,
        at,
    }));
}

pub fn emit_phase_advanced(log: &mut Vec<SaleEvent>, transition: PhaseTransition) {
    log.push(SaleEvent::Advanced(PhaseAdvanced { transition }));
}

pub fn emit_tokens_purchased(
    log: &mut Vec<SaleEvent>,
    buyer: String,
    amount: Amount,
    cost: Amount,
    fills: Vec<Fill>,
    at: Timestamp,
) {
    info!(
        %buyer,
        amount = %amount,
        cost = %cost,
        phases = fills.len(),
        "tokens purchased"
    );
    log.push(SaleEvent::Purchased(TokensPurchased {
        buyer,
        amount,
        cost,
        fills,
        at,
    }));
}

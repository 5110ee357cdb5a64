//! Settlement adapters used by the service.
//!
//! `ledger` mode settles against an in-process [`TokenBook`]; `rpc` mode
//! forwards every transfer, and every reversal, to a JSON-RPC 2.0 settlement
//! endpoint.

use std::time::Duration;

use crowdsale::{Amount, Settlement, SettlementError, TokenBook};
use serde_json::json;
use tracing::{debug, info};

use crate::errors::{ApiError, Result};

/// Reference returned by the settlement backend for a completed transfer.
pub type SettlementRef = Option<String>;

pub enum Settler {
    Book(TokenBook),
    Rpc(RpcSettlement),
}

impl Settler {
    pub async fn collect_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> std::result::Result<SettlementRef, SettlementError> {
        match self {
            Settler::Book(book) => book.collect_payment(buyer, recipient, amount).map(|_| None),
            Settler::Rpc(rpc) => rpc
                .call(
                    "collectPayment",
                    json!({ "buyer": buyer, "recipient": recipient, "amount": amount.to_string() }),
                )
                .await
                .map(Some),
        }
    }

    pub async fn issue_tokens(
        &mut self,
        buyer: &str,
        amount: Amount,
    ) -> std::result::Result<SettlementRef, SettlementError> {
        match self {
            Settler::Book(book) => book.issue_tokens(buyer, amount).map(|_| None),
            Settler::Rpc(rpc) => rpc
                .call(
                    "issueTokens",
                    json!({ "buyer": buyer, "amount": amount.to_string() }),
                )
                .await
                .map(Some),
        }
    }

    pub async fn refund_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> std::result::Result<SettlementRef, SettlementError> {
        match self {
            Settler::Book(book) => book.refund_payment(buyer, recipient, amount).map(|_| None),
            Settler::Rpc(rpc) => rpc
                .call(
                    "refundPayment",
                    json!({ "buyer": buyer, "recipient": recipient, "amount": amount.to_string() }),
                )
                .await
                .map(Some),
        }
    }

    pub async fn return_tokens(
        &mut self,
        buyer: &str,
        amount: Amount,
    ) -> std::result::Result<SettlementRef, SettlementError> {
        match self {
            Settler::Book(book) => book.return_tokens(buyer, amount).map(|_| None),
            Settler::Rpc(rpc) => rpc
                .call(
                    "returnTokens",
                    json!({ "buyer": buyer, "amount": amount.to_string() }),
                )
                .await
                .map(Some),
        }
    }

    /// Stock the token book's treasury with `amount` sale tokens.
    /// The remote endpoint manages its own treasury.
    pub fn fund_treasury(&mut self, amount: Amount) -> Result<()> {
        match self {
            Settler::Book(book) => {
                book.fund_treasury(amount)
                    .map_err(|e| ApiError::Settlement(e.to_string()))?;
                info!(treasury = %book.treasury(), amount = %amount, "funded treasury");
                Ok(())
            }
            Settler::Rpc(_) => Ok(()),
        }
    }

    /// Credit `account` with quote currency and approve the sale to spend it.
    /// Only meaningful for the in-process book.
    pub fn fund_buyer(&mut self, account: &str, amount: Amount) -> Result<()> {
        match self {
            Settler::Book(book) => {
                book.quote
                    .mint(account, amount)
                    .map_err(|e| ApiError::Settlement(e.to_string()))?;
                let sale = book.sale_account().to_string();
                let approved = book.quote.allowance(account, &sale);
                let total = approved
                    .checked_add(amount)
                    .ok_or_else(|| ApiError::Settlement(format!("allowance overflow for {account}")))?;
                book.approve_payment(account, total);
                info!(%account, amount = %amount, "funded buyer");
                Ok(())
            }
            Settler::Rpc(_) => Err(ApiError::Settlement(
                "funding is only available in ledger mode".to_string(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────
// JSON-RPC client
// ─────────────────────────────────────────────────────────

pub struct RpcSettlement {
    client: reqwest::Client,
    url: String,
}

impl RpcSettlement {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Invoke `method` and return the transfer reference from `result.hash`.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<String, SettlementError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SettlementError::Rejected(format!("{method} request failed: {e}")))?;

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            SettlementError::Rejected(format!("failed to parse {method} response: {e}"))
        })?;

        debug!(%method, response = %response_json, "settlement response");

        if let Some(error) = response_json.get("error") {
            return Err(SettlementError::Rejected(format!("{method} failed: {error}")));
        }

        response_json
            .get("result")
            .and_then(|r| r.get("hash"))
            .and_then(|h| h.as_str())
            .map(str::to_string)
            .ok_or_else(|| SettlementError::Rejected(format!("{method} returned no hash")))
    }
}

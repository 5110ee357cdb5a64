//! Settlement collaborators.
//!
//! The engine only computes who owes what. Moving the quote currency and
//! delivering sale tokens is delegated to a [`Settlement`] implementation,
//! invoked after a purchase plan is proven and before it is committed.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("insufficient allowance: {owner} approved {approved}, needs {needed}")]
    InsufficientAllowance {
        owner: String,
        approved: Amount,
        needed: Amount,
    },

    #[error("insufficient balance: {owner} holds {balance}, needs {needed}")]
    InsufficientBalance {
        owner: String,
        balance: Amount,
        needed: Amount,
    },

    #[error("balance overflow for {0}")]
    Overflow(String),

    #[error("settlement rejected: {0}")]
    Rejected(String),
}

pub trait Settlement {
    /// Move `amount` quote currency from `buyer` to `recipient`.
    fn collect_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<(), SettlementError>;

    /// Deliver `amount` sale tokens to `buyer`.
    fn issue_tokens(&mut self, buyer: &str, amount: Amount) -> Result<(), SettlementError>;

    /// Reverse a collected payment when the purchase cannot complete.
    fn refund_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<(), SettlementError>;

    /// Take back `amount` delivered sale tokens from `buyer`.
    fn return_tokens(&mut self, buyer: &str, amount: Amount) -> Result<(), SettlementError>;
}

/// Balances and allowances for one fungible asset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Asset {
    balances: BTreeMap<String, Amount>,
    allowances: BTreeMap<(String, String), Amount>,
}

impl Asset {
    pub fn balance_of(&self, owner: &str) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> Amount {
        self.allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn mint(&mut self, to: &str, amount: Amount) -> Result<(), SettlementError> {
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Overflow(to.to_string()))?;
        self.balances.insert(to.to_string(), balance);
        Ok(())
    }

    pub fn approve(&mut self, owner: &str, spender: &str, amount: Amount) {
        self.allowances
            .insert((owner.to_string(), spender.to_string()), amount);
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: Amount) -> Result<(), SettlementError> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(SettlementError::InsufficientBalance {
                owner: from.to_string(),
                balance: from_balance,
                needed: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Overflow(to.to_string()))?;

        self.balances.insert(from.to_string(), from_balance - amount);
        self.balances.insert(to.to_string(), to_balance);
        Ok(())
    }

    /// Spend `owner`'s allowance to `spender`. Allowance and balances move together.
    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), SettlementError> {
        let approved = self.allowance(from, spender);
        if approved < amount {
            return Err(SettlementError::InsufficientAllowance {
                owner: from.to_string(),
                approved,
                needed: amount,
            });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, approved - amount);
        Ok(())
    }
}

/// In-process book for the quote currency and the sale token.
///
/// Payment is pulled from the buyer's quote allowance to the sale; tokens
/// are pulled from the treasury's sale-token allowance to the buyer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBook {
    /// Principal the sale acts as when spending allowances.
    sale_account: String,
    /// Holder of the unsold sale tokens.
    treasury: String,
    pub quote: Asset,
    pub token: Asset,
}

impl TokenBook {
    pub fn new(sale_account: impl Into<String>, treasury: impl Into<String>) -> Self {
        Self {
            sale_account: sale_account.into(),
            treasury: treasury.into(),
            quote: Asset::default(),
            token: Asset::default(),
        }
    }

    pub fn sale_account(&self) -> &str {
        &self.sale_account
    }

    pub fn treasury(&self) -> &str {
        &self.treasury
    }

    /// Mint `amount` sale tokens to the treasury and approve the sale to sell them.
    pub fn fund_treasury(&mut self, amount: Amount) -> Result<(), SettlementError> {
        let treasury = self.treasury.clone();
        self.token.mint(&treasury, amount)?;
        let approved = self.token.allowance(&treasury, &self.sale_account);
        let total = approved
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Overflow(treasury.clone()))?;
        self.token.approve(&treasury, &self.sale_account, total);
        Ok(())
    }

    /// Buyer-side `approve(sale, amount)` on the quote currency.
    pub fn approve_payment(&mut self, buyer: &str, amount: Amount) {
        let sale = self.sale_account.clone();
        self.quote.approve(buyer, &sale, amount);
    }
}

impl Settlement for TokenBook {
    fn collect_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<(), SettlementError> {
        let sale = self.sale_account.clone();
        self.quote.transfer_from(&sale, buyer, recipient, amount)
    }

    fn issue_tokens(&mut self, buyer: &str, amount: Amount) -> Result<(), SettlementError> {
        let sale = self.sale_account.clone();
        let treasury = self.treasury.clone();
        self.token.transfer_from(&sale, &treasury, buyer, amount)
    }

    fn refund_payment(
        &mut self,
        buyer: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<(), SettlementError> {
        self.quote.transfer(recipient, buyer, amount)
    }

    fn return_tokens(&mut self, buyer: &str, amount: Amount) -> Result<(), SettlementError> {
        let treasury = self.treasury.clone();
        self.token.transfer(buyer, &treasury, amount)
    }
}

use std::sync::Arc;

use crate::ledger::AccountingLedger;
use crate::settlement::{Settlement, SettlementError, TokenBook};
use crate::{Amount, ManualClock, PurchaseReceipt, Result, Sale, SaleConfig, SaleEvent};

pub const E18: Amount = 1_000_000_000_000_000_000;
pub const P1: Amount = 1_300_000_000_000_000;
pub const P2: Amount = 2_600_000_000_000_000;
pub const PHASE_DURATION: u64 = 48 * 60 * 60;

/// Whole tokens to base units at 18 decimals.
pub fn tokens(whole: Amount) -> Amount {
    whole * E18
}

/// Quote cost of `whole` tokens at `price`.
pub fn cost(whole: Amount, price: Amount) -> Amount {
    whole * price
}

pub struct TestContext {
    pub sale: Sale,
    pub clock: ManualClock,
    pub book: TokenBook,
    pub owner: String,
    pub user1: String,
    pub user2: String,
}

impl TestContext {
    /// Default two-phase sale, treasury funded and approved, both users
    /// holding 200M quote, sale started.
    pub fn new() -> Self {
        let mut ctx = Self::unstarted(SaleConfig::default());
        let owner = ctx.owner.clone();
        ctx.sale.start_crowdsale(&owner).unwrap();
        ctx
    }

    pub fn with_config(config: SaleConfig) -> Self {
        let mut ctx = Self::unstarted(config);
        let owner = ctx.owner.clone();
        ctx.sale.start_crowdsale(&owner).unwrap();
        ctx
    }

    pub fn unstarted(config: SaleConfig) -> Self {
        let clock = ManualClock::new(100_000);
        let owner = config.owner.clone();
        let sale = Sale::new(config, Arc::new(clock.clone())).unwrap();

        let mut book = TokenBook::new("crowdsale", "treasury");
        book.fund_treasury(sale.phase_table().ico_supply()).unwrap();

        let user1 = "user1".to_string();
        let user2 = "user2".to_string();
        book.quote.mint(&user1, tokens(200_000_000)).unwrap();
        book.quote.mint(&user2, tokens(200_000_000)).unwrap();

        Self {
            sale,
            clock,
            book,
            owner,
            user1,
            user2,
        }
    }

    pub fn approve(&mut self, buyer: &str, amount: Amount) {
        self.book.approve_payment(buyer, amount);
    }

    pub fn buy(&mut self, buyer: &str, amount: Amount) -> Result<PurchaseReceipt> {
        self.sale.purchase(buyer, amount, &mut self.book)
    }

    /// Approve exactly the quoted cost, then buy.
    pub fn approve_and_buy(&mut self, buyer: &str, amount: Amount) -> Result<PurchaseReceipt> {
        let quoted = self.sale.quote(amount)?.total_cost();
        self.approve(buyer, quoted);
        self.buy(buyer, amount)
    }

    pub fn jump_time(&self, seconds: u64) {
        self.clock.advance(seconds);
    }

    pub fn snapshot(&self) -> AccountingLedger {
        self.sale.ledger().clone()
    }

    pub fn last_event(&self) -> Option<&SaleEvent> {
        self.sale.events().last()
    }
}

/// Settlement that accepts everything; for tests that only care about accounting.
pub struct AcceptAll;

impl Settlement for AcceptAll {
    fn collect_payment(&mut self, _: &str, _: &str, _: Amount) -> std::result::Result<(), SettlementError> {
        Ok(())
    }

    fn issue_tokens(&mut self, _: &str, _: Amount) -> std::result::Result<(), SettlementError> {
        Ok(())
    }

    fn refund_payment(&mut self, _: &str, _: &str, _: Amount) -> std::result::Result<(), SettlementError> {
        Ok(())
    }

    fn return_tokens(&mut self, _: &str, _: Amount) -> std::result::Result<(), SettlementError> {
        Ok(())
    }
}

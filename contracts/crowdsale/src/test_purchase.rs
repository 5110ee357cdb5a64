use std::sync::Arc;

use crate::test_utils::{cost, tokens, AcceptAll, TestContext, P1, P2};
use crate::{Clock, Error, ManualClock, PhaseStatus, Sale, SaleConfig, TokenBook};

#[test]
fn test_first_phase_details() {
    let ctx = TestContext::new();
    let details = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(details.price, P1);
    assert_eq!(details.as_tuple(), (0, 0, P1, 0));
    assert_eq!(details.status, PhaseStatus::Active);
}

#[test]
fn test_purchase_without_payment_approval_fails() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    let before = ctx.snapshot();

    assert_eq!(ctx.buy(&user1, tokens(100_000)), Err(Error::PaymentFailed));
    assert_eq!(ctx.snapshot(), before);
    assert_eq!(ctx.book.token.balance_of(&user1), 0);
}

#[test]
fn test_purchase_below_min_cap() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, cost(100_000, P1));

    assert_eq!(ctx.buy(&user1, tokens(100)), Err(Error::MinCap));
}

#[test]
fn test_purchase_and_rollover_into_second_phase() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();

    // 1. Plain purchase inside phase 1.
    ctx.approve(&user1, cost(100_000, P1));
    let receipt = ctx.buy(&user1, tokens(100_000)).unwrap();
    assert_eq!(receipt.total_cost, cost(100_000, P1));

    let details = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(details.sold, tokens(100_000));
    assert_eq!(details.raised, cost(100_000, P1));
    assert_eq!(details.total_raised, cost(100_000, P1));
    assert_eq!(ctx.book.token.balance_of(&user1), tokens(100_000));

    // 2. Phase 1 sells out before its window ends; the rest lands in phase 2.
    let to_buy = 50_000_000 - 100_000;
    let in_phase1 = 40_000_000 - 100_000;
    let in_phase2 = to_buy - in_phase1;
    let expected = cost(in_phase1, P1) + cost(in_phase2, P2);

    ctx.approve(&user1, expected);
    let receipt = ctx.buy(&user1, tokens(to_buy)).unwrap();
    assert_eq!(receipt.total_cost, expected);
    assert_eq!(receipt.fills.len(), 2);

    let phase1 = ctx.sale.get_phase_details(1).unwrap();
    let phase2 = ctx.sale.get_phase_details(2).unwrap();

    assert_eq!(phase1.raised, cost(40_000_000, P1));
    assert_eq!(phase1.sold, tokens(40_000_000));
    assert_eq!(phase1.price, P1);
    assert_eq!(phase1.total_raised, tokens(78_000));
    assert_eq!(phase1.status, PhaseStatus::Closed);

    assert_eq!(phase2.raised, cost(10_000_000, P2));
    assert_eq!(phase2.sold, tokens(10_000_000));
    assert_eq!(phase2.price, P2);
    assert_eq!(phase2.total_raised, tokens(78_000));

    assert_eq!(ctx.book.token.balance_of(&user1), tokens(50_000_000));
    assert_eq!(ctx.book.quote.balance_of("treasury"), tokens(78_000));
}

#[test]
fn test_exceeding_ico_supply_leaves_state_unchanged() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, u128::MAX);
    let before = ctx.snapshot();

    assert_eq!(ctx.buy(&user1, tokens(210_000_000)), Err(Error::ExceedIcoSupply));
    assert_eq!(ctx.snapshot(), before);
}

#[test]
fn test_ico_supply_check_uses_current_total_sold() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve_and_buy(&user1, tokens(100_000)).unwrap();
    ctx.approve(&user1, u128::MAX);

    // Fresh, 50M would fit exactly; after 100k sold it no longer does.
    let before = ctx.snapshot();
    assert_eq!(ctx.buy(&user1, tokens(50_000_000)), Err(Error::ExceedIcoSupply));
    assert_eq!(ctx.snapshot(), before);

    assert!(ctx.buy(&user1, tokens(49_900_000)).is_ok());
    assert_eq!(ctx.sale.summary().remaining_supply, 0);
}

#[test]
fn test_exact_phase_fill_advances_on_next_request() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();

    let receipt = ctx.approve_and_buy(&user1, tokens(40_000_000)).unwrap();
    assert_eq!(receipt.fills.len(), 1);
    assert!(receipt.transitions.is_empty());

    let phase1 = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(phase1.sold, tokens(40_000_000));
    assert_eq!(phase1.status, PhaseStatus::Active);
    assert_eq!(ctx.sale.get_phase_details(2).unwrap().sold, 0);
    assert_eq!(ctx.sale.active_phase(), Ok(2));

    let receipt = ctx.approve_and_buy(&user1, tokens(1_000)).unwrap();
    assert_eq!(receipt.fills[0].phase, 2);
    assert_eq!(receipt.total_cost, cost(1_000, P2));
    assert_eq!(receipt.transitions.len(), 1);
    assert_eq!(
        ctx.sale.get_phase_details(1).unwrap().status,
        PhaseStatus::Closed
    );
}

#[test]
fn test_phase_details_reads_are_idempotent() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve_and_buy(&user1, tokens(123_456)).unwrap();

    let first = ctx.sale.get_phase_details(1).unwrap();
    ctx.jump_time(10);
    let second = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unknown_phase_details() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sale.get_phase_details(0), Err(Error::UnknownPhase));
    assert_eq!(ctx.sale.get_phase_details(3), Err(Error::UnknownPhase));
}

#[test]
fn test_purchase_before_start() {
    let mut ctx = TestContext::unstarted(SaleConfig::default());
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, u128::MAX);

    assert_eq!(ctx.buy(&user1, tokens(100_000)), Err(Error::SaleNotStarted));
    assert_eq!(ctx.sale.active_phase(), Err(Error::SaleNotStarted));
}

#[test]
fn test_start_is_owner_only_and_one_shot() {
    let mut ctx = TestContext::unstarted(SaleConfig::default());
    assert_eq!(ctx.sale.start_crowdsale("mallory"), Err(Error::NotAuthorized));

    let owner = ctx.owner.clone();
    ctx.sale.start_crowdsale(&owner).unwrap();
    assert_eq!(
        ctx.sale.get_phase_details(1).unwrap().started_at,
        Some(ctx.clock.now())
    );
    assert_eq!(ctx.sale.start_crowdsale(&owner), Err(Error::AlreadyStarted));
}

#[test]
fn test_failed_issuance_refunds_and_changes_nothing() {
    let clock = ManualClock::new(1_000);
    let mut sale = Sale::new(SaleConfig::default(), Arc::new(clock)).unwrap();
    sale.start_crowdsale("owner").unwrap();

    // Treasury never funded: payment succeeds, delivery does not.
    let mut book = TokenBook::new("crowdsale", "treasury");
    book.quote.mint("buyer", tokens(1_000)).unwrap();
    book.approve_payment("buyer", tokens(1_000));
    let before = sale.ledger().clone();

    assert_eq!(
        sale.purchase("buyer", tokens(10_000), &mut book),
        Err(Error::IssuanceFailed)
    );
    assert_eq!(sale.ledger(), &before);
    assert_eq!(book.quote.balance_of("buyer"), tokens(1_000));
    assert_eq!(book.quote.balance_of("treasury"), 0);
    assert_eq!(sale.events().len(), 1);
}

#[test]
fn test_quote_then_commit() {
    let mut ctx = TestContext::new();
    let plan = ctx.sale.quote(tokens(2_000)).unwrap();
    assert_eq!(plan.total_cost(), cost(2_000, P1));
    assert_eq!(ctx.sale.summary().total_sold, 0);

    let receipt = ctx.sale.commit("user2", plan).unwrap();
    assert_eq!(receipt.amount, tokens(2_000));
    assert_eq!(ctx.sale.summary().total_sold, tokens(2_000));
}

#[test]
fn test_stale_plan_rejected() {
    let mut ctx = TestContext::new();
    let stale = ctx.sale.quote(tokens(2_000)).unwrap();
    ctx.sale
        .purchase("user1", tokens(5_000), &mut AcceptAll)
        .unwrap();
    let before = ctx.snapshot();

    assert_eq!(ctx.sale.commit("user2", stale), Err(Error::StalePlan));
    assert_eq!(ctx.snapshot(), before);
}

#[test]
fn test_rounding_is_toward_zero_per_fill() {
    let mut config = SaleConfig::default();
    config.min_purchase = 1;
    // One whole token is 10 base units.
    config.phases[0].price = 3;
    config.phases[0].supply_cap = 10;
    config.decimals = 1;
    config.phases[1].price = 7;
    config.phases[1].supply_cap = 10;

    let mut ctx = TestContext::with_config(config);
    // 15 base units: 10 at 3/10 -> 3, 5 at 7/10 -> 3 (3.5 floored).
    let receipt = ctx.sale.purchase("user1", 15, &mut AcceptAll).unwrap();
    assert_eq!(receipt.fills[0].cost, 3);
    assert_eq!(receipt.fills[1].cost, 3);
    assert_eq!(receipt.total_cost, 6);
    assert_eq!(ctx.sale.summary().total_raised, 6);
}

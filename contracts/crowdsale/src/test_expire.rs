use crate::test_utils::{cost, tokens, TestContext, P1, P2, PHASE_DURATION};
use crate::{AdvanceReason, Error, PhaseStatus};

#[test]
fn test_phase_rolls_over_when_window_elapses() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();

    ctx.approve_and_buy(&user1, tokens(100_000)).unwrap();
    let phase1 = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(phase1.sold, tokens(100_000));
    assert_eq!(phase1.raised, cost(100_000, P1));
    assert_eq!(phase1.total_raised, cost(100_000, P1));

    ctx.jump_time(PHASE_DURATION + 100);

    ctx.approve(&user1, cost(100_000, P2));
    let receipt = ctx.buy(&user1, tokens(100_000)).unwrap();
    assert_eq!(receipt.total_cost, cost(100_000, P2));
    assert_eq!(receipt.transitions.len(), 1);
    assert_eq!(receipt.transitions[0].reason, AdvanceReason::Expired);
    assert_eq!(
        receipt.transitions[0].forfeited,
        tokens(40_000_000 - 100_000)
    );

    let phase2 = ctx.sale.get_phase_details(2).unwrap();
    assert_eq!(phase2.raised, cost(100_000, P2));
    assert_eq!(phase2.sold, tokens(100_000));
    assert_eq!(phase2.price, P2);

    // The expired phase keeps its totals and never sells again.
    let phase1 = ctx.sale.get_phase_details(1).unwrap();
    assert_eq!(phase1.status, PhaseStatus::Closed);
    assert_eq!(phase1.sold, tokens(100_000));
}

#[test]
fn test_purchase_just_before_expiry_stays_in_phase() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.jump_time(PHASE_DURATION - 1);

    let receipt = ctx.approve_and_buy(&user1, tokens(5_000)).unwrap();
    assert_eq!(receipt.fills[0].phase, 1);
    assert_eq!(receipt.total_cost, cost(5_000, P1));
}

#[test]
fn test_expiry_is_visible_before_any_purchase() {
    let ctx = TestContext::new();
    ctx.jump_time(PHASE_DURATION);

    assert_eq!(ctx.sale.active_phase(), Ok(2));
    // Reading never applies the transition.
    assert_eq!(
        ctx.sale.get_phase_details(1).unwrap().status,
        PhaseStatus::Active
    );
    assert_eq!(ctx.sale.ledger().sale().active_phase, 1);
}

#[test]
fn test_forfeited_supply_is_unreachable() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, u128::MAX);
    ctx.jump_time(PHASE_DURATION);
    let before = ctx.snapshot();

    // 20M passes the global check (50M unsold) but only 10M is reachable.
    assert_eq!(ctx.buy(&user1, tokens(20_000_000)), Err(Error::ExceedIcoSupply));
    assert_eq!(ctx.snapshot(), before);
    assert_eq!(ctx.book.token.balance_of(&user1), 0);

    assert!(ctx.buy(&user1, tokens(10_000_000)).is_ok());
    assert_eq!(ctx.sale.summary().total_sold, tokens(10_000_000));
}

#[test]
fn test_last_phase_expiry_ends_sale() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, u128::MAX);

    ctx.jump_time(PHASE_DURATION);
    ctx.buy(&user1, tokens(1_000)).unwrap();
    ctx.jump_time(PHASE_DURATION);
    let before = ctx.snapshot();

    assert_eq!(ctx.buy(&user1, tokens(1_000)), Err(Error::SaleEnded));
    assert_eq!(ctx.sale.active_phase(), Err(Error::SaleEnded));
    assert_eq!(ctx.snapshot(), before);
}

#[test]
fn test_second_phase_window_starts_at_activation() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve(&user1, u128::MAX);

    // Phase 1 expires long after its window; phase 2 gets a full window from now.
    ctx.jump_time(3 * PHASE_DURATION);
    ctx.buy(&user1, tokens(1_000)).unwrap();
    let activated = ctx.sale.get_phase_details(2).unwrap().started_at.unwrap();

    ctx.jump_time(PHASE_DURATION - 1);
    let receipt = ctx.buy(&user1, tokens(1_000)).unwrap();
    assert_eq!(receipt.fills[0].phase, 2);
    assert_eq!(
        ctx.sale.get_phase_details(2).unwrap().started_at,
        Some(activated)
    );
}

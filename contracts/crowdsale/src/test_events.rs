use crate::events::{PhaseAdvanced, SaleStarted, TokensPurchased};
use crate::test_utils::{cost, tokens, TestContext, P1, P2};
use crate::{AdvanceReason, Clock, SaleConfig, SaleEvent};

#[test]
fn test_sale_started_event() {
    let ctx = TestContext::new();
    let event = ctx.last_event().expect("No events found");
    assert_eq!(
        event,
        &SaleEvent::Started(SaleStarted {
            owner: ctx.owner.clone(),
            phase: 1,
            at: ctx.clock.now(),
        })
    );
}

#[test]
fn test_tokens_purchased_event() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    let receipt = ctx.approve_and_buy(&user1, tokens(2_000)).unwrap();

    let event = ctx.last_event().expect("No events found");
    assert_eq!(
        event,
        &SaleEvent::Purchased(TokensPurchased {
            buyer: user1,
            amount: tokens(2_000),
            cost: cost(2_000, P1),
            fills: receipt.fills.clone(),
            at: ctx.clock.now(),
        })
    );
}

#[test]
fn test_rollover_emits_advance_before_purchase() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.sale.drain_events();

    ctx.approve_and_buy(&user1, tokens(40_001_000)).unwrap();
    let events = ctx.sale.drain_events();
    assert_eq!(events.len(), 2);

    match &events[0] {
        SaleEvent::Advanced(PhaseAdvanced { transition }) => {
            assert_eq!((transition.from, transition.to), (1, 2));
            assert_eq!(transition.reason, AdvanceReason::SoldOut);
        }
        other => panic!("expected advance, got {other:?}"),
    }
    match &events[1] {
        SaleEvent::Purchased(p) => {
            assert_eq!(p.cost, cost(40_000_000, P1) + cost(1_000, P2));
            assert_eq!(p.fills.len(), 2);
        }
        other => panic!("expected purchase, got {other:?}"),
    }
}

#[test]
fn test_failed_purchase_emits_nothing() {
    let mut ctx = TestContext::unstarted(SaleConfig::default());
    let user1 = ctx.user1.clone();
    assert!(ctx.buy(&user1, tokens(2_000)).is_err());
    assert!(ctx.sale.events().is_empty());

    let mut ctx = TestContext::new();
    ctx.sale.drain_events();
    assert!(ctx.buy(&user1, tokens(2_000)).is_err());
    assert!(ctx.sale.events().is_empty());
}

#[test]
fn test_event_json_shape() {
    let mut ctx = TestContext::new();
    let user1 = ctx.user1.clone();
    ctx.approve_and_buy(&user1, tokens(2_000)).unwrap();

    let event = ctx.last_event().unwrap().clone();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "purchased");
    assert_eq!(json["amount"], tokens(2_000).to_string());
    assert_eq!(event.kind(), "purchased");

    let back: SaleEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

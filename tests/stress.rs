//! Stress Tests - Push the engine to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Growth past the pre-allocated arena
//! - High contention at single price levels
//! - Rapid order churn
//! - Concurrent intake from many threads
//! - Extreme prices and quantities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use match_book::{
    Engine, EngineConfig, EngineError, OrderRequest, OrderType, Quote, ReadConsistency, Side, Trade,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;

fn d(v: i64) -> Decimal {
    Decimal::from(v)
}

fn engine_with_capacity(capacity: u32) -> Engine {
    let mut config = EngineConfig::new("STRESS");
    config.order_capacity = capacity;
    Engine::new(config).unwrap()
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_grows_past_initial_capacity() {
    let engine = engine_with_capacity(100);

    // Non-overlapping prices: bids 8000-8099, asks 10000-10099
    for i in 0..1_000i64 {
        let (side, price) = if i % 2 == 0 {
            (Side::Buy, 8_000 + i % 100)
        } else {
            (Side::Sell, 10_000 + i % 100)
        };
        let exec = engine
            .execute(OrderRequest::limit(side, d(price), d(100)))
            .unwrap();
        assert_eq!(exec.resting_qty, d(100), "order {} should rest", i);
    }

    assert_eq!(engine.order_count(), 1_000);
    assert!(engine.audit().is_empty());
}

#[test]
fn test_arena_returns_all_slots() {
    let engine = engine_with_capacity(64);
    let mut rng = ChaCha8Rng::seed_from_u64(0xA11C);

    for _ in 0..5_000 {
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let price = d(rng.gen_range(990..1010));
        engine
            .submit(OrderRequest::limit(side, price, d(rng.gen_range(1..20))))
            .unwrap();
    }

    // Drain everything that is still resting
    let last_id = 5_000u64;
    for order_id in 1..=last_id {
        let _ = engine.cancel(order_id);
    }

    assert_eq!(engine.order_count(), 0);
    let snap = engine.snapshot(usize::MAX);
    assert!(snap.bids.is_empty() && snap.asks.is_empty());
    assert!(engine.audit().is_empty());
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let engine = Engine::default();
    const ORDERS: i64 = 1_000;

    for _ in 0..ORDERS {
        engine
            .submit(OrderRequest::limit(Side::Sell, d(10_000), d(100)))
            .unwrap();
    }
    assert_eq!(engine.order_count(), ORDERS as usize);

    let trades = engine
        .submit(OrderRequest::limit(Side::Buy, d(10_000), d(ORDERS * 100)))
        .unwrap();

    assert_eq!(trades.len(), ORDERS as usize);
    assert_eq!(engine.order_count(), 0);
    // FIFO: makers in arrival order
    assert!(trades
        .windows(2)
        .all(|w| w[0].maker_order_id < w[1].maker_order_id));
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let engine = Engine::default();

    for _ in 0..10_000 {
        let exec = engine
            .execute(OrderRequest::limit(Side::Buy, d(100), d(1)))
            .unwrap();
        engine.cancel(exec.order_id).unwrap();
    }

    assert_eq!(engine.order_count(), 0);
    assert!(engine.best_bid_offer().bid.is_empty());
}

#[test]
fn test_rapid_match_cycles() {
    let engine = Engine::default();

    for _ in 0..5_000 {
        engine
            .submit(OrderRequest::limit(Side::Sell, d(100), d(10)))
            .unwrap();
        let trades = engine
            .submit(OrderRequest::limit(Side::Buy, d(100), d(10)))
            .unwrap();
        assert_eq!(trades.len(), 1);
    }

    assert_eq!(engine.trade_count(), 5_000);
    assert_eq!(engine.order_count(), 0);
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_extreme_prices_and_quantities() {
    let engine = Engine::default();
    let huge = Decimal::from(1_000_000_000_000i64);
    let tiny = Decimal::new(1, 8);

    engine.submit(OrderRequest::limit(Side::Sell, huge, tiny)).unwrap();
    engine.submit(OrderRequest::limit(Side::Buy, tiny, huge)).unwrap();
    assert_eq!(engine.spread(), Some(huge - tiny));

    let trades = engine
        .submit(OrderRequest::market(Side::Buy, tiny))
        .unwrap();
    assert_eq!(trades[0].price, huge);
    assert_eq!(trades[0].quantity, tiny);
    assert_eq!(trades[0].notional(), Decimal::from(10_000));
}

#[test]
fn test_out_of_range_notional_rejected_before_matching() {
    let engine = Engine::default();
    let big = Decimal::from(1_000_000_000_000_000i64);

    // A resting order whose own notional cannot be represented never enters
    assert_eq!(
        engine.submit(OrderRequest::limit(Side::Sell, big, big)),
        Err(EngineError::Overflow("notional"))
    );
    assert_eq!(engine.order_count(), 0);

    let exec = engine
        .execute(OrderRequest::limit(Side::Sell, big, Decimal::ONE))
        .unwrap();
    assert_eq!(exec.order_id, 1);
    let before = engine.state_hash();

    // Sweeping takers are bounded by the highest price they can reach
    for request in [
        OrderRequest::market(Side::Buy, big),
        OrderRequest::ioc(Side::Buy, big, big),
        OrderRequest::fok(Side::Buy, big, big),
    ] {
        assert_eq!(engine.submit(request), Err(EngineError::Overflow("notional")));
    }
    assert_eq!(engine.state_hash(), before);
    assert_eq!(engine.trade_count(), 0);
    assert_eq!(engine.best_bid_offer().ask, Quote::new(big, Decimal::ONE));

    // The same book still trades normally
    let trades = engine
        .submit(OrderRequest::limit(Side::Buy, big, Decimal::ONE))
        .unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].taker_order_id, 2);
    assert!(engine.audit().is_empty());
}

#[test]
fn test_level_aggregate_overflow_rejected() {
    let engine = Engine::default();
    let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);

    engine
        .submit(OrderRequest::limit(Side::Sell, Decimal::ONE, huge))
        .unwrap();
    assert_eq!(
        engine.submit(OrderRequest::limit(Side::Sell, Decimal::ONE, huge)),
        Err(EngineError::Overflow("level aggregate"))
    );
    assert_eq!(
        engine.adjust_level(Side::Sell, Decimal::ONE, huge),
        Err(EngineError::Overflow("level aggregate"))
    );

    assert_eq!(engine.order_count(), 1);
    assert_eq!(engine.best_bid_offer().ask, Quote::new(Decimal::ONE, huge));
    assert!(engine.audit().is_empty());
}

#[test]
fn test_fractional_quantities_fill_exactly() {
    let engine = Engine::default();
    let third = Decimal::new(3333, 4);

    for _ in 0..3 {
        engine
            .submit(OrderRequest::limit(Side::Sell, d(50), third))
            .unwrap();
    }
    let trades = engine
        .submit(OrderRequest::ioc(Side::Buy, d(50), Decimal::ONE))
        .unwrap();

    let filled: Decimal = trades.iter().map(|t| t.quantity).sum();
    assert_eq!(filled, Decimal::new(9999, 4));
    assert_eq!(engine.order_count(), 0);
    assert!(engine.best_bid_offer().ask.is_empty());
}

#[test]
fn test_many_price_levels() {
    let engine = Engine::default();
    for i in 0..2_000 {
        engine
            .submit(OrderRequest::limit(Side::Buy, d(1 + i), d(1)))
            .unwrap();
    }

    let snap = engine.snapshot(2_500);
    assert_eq!(snap.bids.len(), 2_000);
    assert_eq!(snap.bids[0].price, d(2_000));

    let trades = engine
        .submit(OrderRequest::market(Side::Sell, d(2_000)))
        .unwrap();
    assert_eq!(trades.len(), 2_000);
    assert_eq!(trades.last().map(|t| t.price), Some(d(1)));
}

#[test]
fn test_self_trade_allowed() {
    let engine = Engine::default();
    engine
        .submit(OrderRequest::limit(Side::Sell, d(100), d(5)))
        .unwrap();
    let trades = engine
        .submit(OrderRequest::limit(Side::Buy, d(100), d(5)))
        .unwrap();
    assert_eq!(trades.len(), 1);
}

#[test]
fn test_cancel_during_partial_fill() {
    let engine = Engine::default();
    engine
        .submit(OrderRequest::limit(Side::Sell, d(100), d(10)))
        .unwrap();
    engine
        .submit(OrderRequest::ioc(Side::Buy, d(100), d(4)))
        .unwrap();

    let canceled = engine.cancel(1).unwrap();
    assert_eq!(canceled.canceled_qty, d(6));
    assert!(engine.cancel(1).is_err());
}

// ============================================================================
// IOC/FOK Order Type Tests
// ============================================================================

#[test]
fn test_ioc_never_rests() {
    let engine = Engine::default();
    let mut rng = ChaCha8Rng::seed_from_u64(0x10C);

    for _ in 0..2_000 {
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let order_type = if rng.gen_bool(0.5) { OrderType::Ioc } else { OrderType::Limit };
        let req = OrderRequest::new(side, order_type, d(rng.gen_range(95..105)), d(rng.gen_range(1..10)));
        let exec = engine.execute(req).unwrap();
        if order_type == OrderType::Ioc {
            assert!(engine.order(exec.order_id).is_none());
        }
    }
    assert!(engine.audit().is_empty());
}

#[test]
fn test_fok_all_or_nothing() {
    let engine = Engine::default();
    let mut rng = ChaCha8Rng::seed_from_u64(0xF0C);

    for _ in 0..2_000 {
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        if rng.gen_bool(0.6) {
            engine
                .submit(OrderRequest::limit(side, d(rng.gen_range(95..105)), d(rng.gen_range(1..10))))
                .unwrap();
        } else {
            let qty = d(rng.gen_range(1..30));
            let trades = engine
                .submit(OrderRequest::fok(side, d(rng.gen_range(95..105)), qty))
                .unwrap();
            let filled: Decimal = trades.iter().map(|t| t.quantity).sum();
            assert!(filled.is_zero() || filled == qty, "FOK partially filled");
        }
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_intake_keeps_book_consistent() {
    const THREADS: u64 = 8;
    const ORDERS_PER_THREAD: u64 = 1_000;

    let engine = Arc::new(Engine::default());
    let heard = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&heard);
    engine
        .set_trade_listener(Arc::new(move |_: &Trade| {
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(t);
                let mut ids = Vec::new();
                for _ in 0..ORDERS_PER_THREAD {
                    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                    let req = OrderRequest::limit(side, d(rng.gen_range(95..105)), d(rng.gen_range(1..10)));
                    let exec = engine.execute(req).unwrap();
                    ids.push(exec.order_id);
                    if rng.gen_bool(0.2) {
                        let _ = engine.cancel(exec.order_id);
                    }
                    let bbo = engine.best_bid_offer();
                    if let (Some(bid), Some(ask)) = (bbo.best_bid(), bbo.best_ask()) {
                        assert!(bid.price < ask.price);
                    }
                }
                ids
            })
        })
        .collect();

    let mut all_ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all_ids.sort_unstable();
    all_ids.dedup();

    // Every submission got a distinct id
    assert_eq!(all_ids.len() as u64, THREADS * ORDERS_PER_THREAD);
    assert!(engine.audit().is_empty());
    assert_eq!(heard.load(Ordering::Relaxed), engine.trade_count());

    let trade_ids: Vec<_> = engine.trades().iter().map(|t| t.trade_id).collect();
    assert!(trade_ids.windows(2).all(|w| w[0] + 1 == w[1]));
}

#[test]
fn test_published_readers_never_block_on_writers() {
    let config = EngineConfig::new("STRESS").with_read_consistency(ReadConsistency::Published);
    let engine = Arc::new(Engine::new(config).unwrap());

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..5_000i64 {
                let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                let price = if side == Side::Buy { 99 - i % 5 } else { 101 + i % 5 };
                engine
                    .submit(OrderRequest::limit(side, d(price), d(1)))
                    .unwrap();
            }
        })
    };

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..5_000 {
                let snap = engine.snapshot(5);
                // A published view is never torn: sides are internally sorted
                assert!(snap.bids.windows(2).all(|w| w[0].price > w[1].price));
                assert!(snap.asks.windows(2).all(|w| w[0].price < w[1].price));
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(engine.best_bid_offer().bid.price, d(99));
    assert_eq!(engine.best_bid_offer().ask.price, d(101));
}

//! Property-based and deterministic invariant tests.
//!
//! Uses proptest to generate books and order streams; checks quantity conservation,
//! price limits, maker pricing and asset conservation through the reference ledger.

use pair_matching_engine::book_gen::{replay_into_engine, seed_ledger, Generator, GeneratorConfig};
use pair_matching_engine::{
    match_book, BookSnapshot, FeeStructure, InMemoryLedger, MatchingEngine, Order, OrderId, OrderStatus, OrderType,
    Side, TradingPairId, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

fn order(id: u64, side: Side, price: i64, amount: i64, created_at: u64) -> Order {
    Order {
        id: OrderId(id),
        user_id: UserId(id),
        trading_pair_id: TradingPairId(1),
        side,
        order_type: OrderType::Limit,
        price: Decimal::from(price),
        amount: Decimal::from(amount),
        filled_amount: Decimal::ZERO,
        remaining_amount: Decimal::from(amount),
        status: OrderStatus::Pending,
        fee_percentage: None,
        created_at,
        updated_at: created_at,
        filled_at: None,
        canceled_at: None,
    }
}

/// (price, amount) pairs for one side of the book.
fn side_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((90i64..=110, 1i64..=20), 0..12)
}

fn build_book(bids: &[(i64, i64)], asks: &[(i64, i64)]) -> BookSnapshot {
    let mut id = 0u64;
    let mut next = |side, (price, amount): &(i64, i64)| {
        id += 1;
        order(id, side, *price, *amount, id)
    };
    let bids: Vec<Order> = bids.iter().map(|b| next(Side::Buy, b)).collect();
    let asks: Vec<Order> = asks.iter().map(|a| next(Side::Sell, a)).collect();
    BookSnapshot::from_orders(TradingPairId(1), bids, asks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn executions_never_overfill_and_respect_limits(bids in side_strategy(), asks in side_strategy()) {
        let snapshot = build_book(&bids, &asks);
        let plan = match_book(&snapshot, FeeStructure::new(Decimal::new(1, 3), Decimal::new(2, 3)));

        let mut filled: HashMap<OrderId, Decimal> = HashMap::new();
        for exec in &plan.executions {
            prop_assert!(exec.amount > Decimal::ZERO);
            let buy = snapshot.bids.iter().find(|o| o.id == exec.buy_order_id).unwrap();
            let sell = snapshot.asks.iter().find(|o| o.id == exec.sell_order_id).unwrap();
            prop_assert!(buy.price >= sell.price);
            // Maker price: the resting sell's price.
            prop_assert_eq!(exec.price, sell.price);
            prop_assert_eq!(exec.fees.total_value, exec.amount * exec.price);
            *filled.entry(buy.id).or_default() += exec.amount;
            *filled.entry(sell.id).or_default() += exec.amount;
        }
        for o in snapshot.bids.iter().chain(snapshot.asks.iter()) {
            let f = filled.get(&o.id).copied().unwrap_or_default();
            prop_assert!(f <= o.amount, "order {} overfilled: {} of {}", o.id, f, o.amount);
        }

        let bought: Decimal = plan.executions.iter().map(|e| e.amount).sum();
        let consumed_bids: Decimal = plan.book.bids.iter().map(|b| b.amount - b.remaining).sum();
        let consumed_asks: Decimal = plan.book.asks.iter().map(|a| a.amount - a.remaining).sum();
        prop_assert_eq!(bought, consumed_bids);
        prop_assert_eq!(bought, consumed_asks);
    }

    #[test]
    fn leftover_book_is_not_crossed(bids in side_strategy(), asks in side_strategy()) {
        let snapshot = build_book(&bids, &asks);
        let plan = match_book(&snapshot, FeeStructure::zero());
        let best_bid = plan.book.bids.iter().filter(|b| !b.is_exhausted()).map(|b| b.price).max();
        let best_ask = plan.book.asks.iter().filter(|a| !a.is_exhausted()).map(|a| a.price).min();
        if let (Some(b), Some(a)) = (best_bid, best_ask) {
            prop_assert!(b < a, "crossed leftover book: bid {} ask {}", b, a);
        }
    }

    #[test]
    fn matching_is_deterministic(bids in side_strategy(), asks in side_strategy()) {
        let snapshot = build_book(&bids, &asks);
        let a = match_book(&snapshot, FeeStructure::zero());
        let b = match_book(&snapshot, FeeStructure::zero());
        prop_assert_eq!(a.executions, b.executions);
        prop_assert_eq!(a.filled_buy_orders, b.filled_buy_orders);
        prop_assert_eq!(a.filled_sell_orders, b.filled_sell_orders);
    }

    #[test]
    fn replay_conserves_assets_and_fee_income(seed in 0u64..500, num_orders in 1usize..60) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let config = GeneratorConfig { seed, num_orders, limit_ratio: 0.9, ..Default::default() };
            let ledger = Arc::new(InMemoryLedger::new());
            let fees = FeeStructure::new(Decimal::new(6, 3), Decimal::new(11, 3));
            seed_ledger(&ledger, &config, fees, Decimal::from(500_000), Decimal::from(5_000)).unwrap();
            let engine = MatchingEngine::new(ledger.clone());

            let orders = Generator::new(config.clone()).all_orders();
            replay_into_engine(&engine, &ledger, orders).await;

            let users = Decimal::from(config.num_users);
            assert_eq!(ledger.total_supply("QUOTE"), users * Decimal::from(500_000));
            assert_eq!(ledger.total_supply("BASE"), users * Decimal::from(5_000));

            let fees_booked: Decimal = ledger.trades().iter().map(|t| t.buyer_fee + t.seller_fee).sum();
            assert_eq!(ledger.fee_income("QUOTE"), fees_booked);
            for t in ledger.trades() {
                assert_eq!(t.buyer_net, t.total_value + t.buyer_fee);
                assert_eq!(t.seller_net, t.total_value - t.seller_fee);
            }
            for user in 1..=config.num_users {
                for asset in ["QUOTE", "BASE"] {
                    let b = ledger.balance(UserId(user), asset);
                    assert!(b.available >= Decimal::ZERO && b.locked >= Decimal::ZERO);
                }
            }
        });
    }
}

#[test]
fn same_seed_same_trades() {
    let run = || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let config = GeneratorConfig { seed: 7, num_orders: 80, ..Default::default() };
            let ledger = Arc::new(InMemoryLedger::new());
            seed_ledger(&ledger, &config, FeeStructure::zero(), Decimal::from(1_000_000), Decimal::from(10_000))
                .unwrap();
            let engine = MatchingEngine::new(ledger.clone());
            replay_into_engine(&engine, &ledger, Generator::new(config).all_orders()).await;
            ledger
                .trades()
                .into_iter()
                .map(|t| (t.buy_order_id, t.sell_order_id, t.price, t.amount))
                .collect::<Vec<_>>()
        })
    };
    assert_eq!(run(), run());
}

//! Synthetic order flow generator.
//!
//! Deterministic, configurable stream of placement requests for replay tests,
//! demos and benches. Same seed ⇒ same sequence of orders.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::engine::MatchingEngine;
use crate::error::LedgerError;
use crate::fees::FeeStructure;
use crate::memory::{InMemoryLedger, NewOrder, TradingPair};
use crate::types::{OrderType, Side, TradingPairId, UserId};

/// Configuration for the synthetic order generator.
/// All ranges are inclusive. Same config + seed produces the same stream.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// RNG seed.
    pub seed: u64,
    pub trading_pair_id: TradingPairId,
    /// Number of orders returned by [`Generator::all_orders`].
    pub num_orders: usize,
    /// Probability of Buy (0.0..=1.0). Sell otherwise.
    pub buy_ratio: f64,
    /// Probability of Limit order (0.0..=1.0). Market otherwise.
    pub limit_ratio: f64,
    /// Price range in whole quote units; ignored for market orders.
    pub price_min: i64,
    pub price_max: i64,
    /// Amount range in whole base units.
    pub amount_min: u64,
    pub amount_max: u64,
    /// Number of distinct users (1..=num_users).
    pub num_users: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            trading_pair_id: TradingPairId(1),
            num_orders: 1000,
            buy_ratio: 0.5,
            limit_ratio: 1.0,
            price_min: 95,
            price_max: 105,
            amount_min: 1,
            amount_max: 100,
            num_users: 5,
        }
    }
}

/// Deterministic order stream. Create with [`Generator::new`]; iterate to get orders.
pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn next_order(&mut self) -> NewOrder {
        let side = if self.rng.gen::<f64>() < self.config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let is_limit = self.rng.gen::<f64>() < self.config.limit_ratio;
        let amount = Decimal::from(self.rng.gen_range(self.config.amount_min..=self.config.amount_max));
        let price = if is_limit {
            Decimal::from(self.rng.gen_range(self.config.price_min..=self.config.price_max))
        } else {
            Decimal::ZERO
        };
        let user_id = UserId(self.rng.gen_range(1..=self.config.num_users.max(1)));
        NewOrder {
            user_id,
            trading_pair_id: self.config.trading_pair_id,
            side,
            order_type: if is_limit { OrderType::Limit } else { OrderType::Market },
            price,
            amount,
        }
    }

    pub fn take_orders(&mut self, n: usize) -> Vec<NewOrder> {
        (0..n).map(|_| self.next_order()).collect()
    }

    /// Returns the full stream of orders as defined by `config.num_orders`.
    pub fn all_orders(&mut self) -> Vec<NewOrder> {
        self.take_orders(self.config.num_orders)
    }
}

/// Registers `config.trading_pair_id` as `BASE-QUOTE` with the given fees and funds every
/// generated user with `quote` units of QUOTE and `base` units of BASE.
pub fn seed_ledger(
    ledger: &InMemoryLedger,
    config: &GeneratorConfig,
    fees: FeeStructure,
    quote: Decimal,
    base: Decimal,
) -> Result<(), LedgerError> {
    ledger.add_pair(TradingPair {
        id: config.trading_pair_id,
        symbol: "BASE-QUOTE".into(),
        base_asset: "BASE".into(),
        quote_asset: "QUOTE".into(),
        fees,
    })?;
    for user in 1..=config.num_users.max(1) {
        ledger.deposit(UserId(user), "QUOTE", quote)?;
        ledger.deposit(UserId(user), "BASE", base)?;
    }
    Ok(())
}

/// Places each order and runs a match pass after it, the way the order route does.
/// Orders the ledger rejects (e.g. insufficient funds) are skipped.
/// Returns `(placed, trades)`.
pub async fn replay_into_engine(
    engine: &MatchingEngine,
    ledger: &InMemoryLedger,
    orders: impl IntoIterator<Item = NewOrder>,
) -> (usize, usize) {
    let mut placed = 0usize;
    let mut trades = 0usize;
    for order in orders {
        let pair = order.trading_pair_id;
        if ledger.place_order(order).is_err() {
            continue;
        }
        placed += 1;
        trades += engine.match_orders(pair).await.executed_trades.len();
    }
    (placed, trades)
}

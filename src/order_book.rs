//! Order book snapshot for one trading pair: bids and asks in price-time priority.
//!
//! [`load_book`] reads resting orders from an [`OrderSource`] and fixes their order:
//! best bid is the highest price, best ask the lowest, and within a price level
//! the earlier `created_at` comes first. The matching scan never re-sorts, so this
//! is the only place time priority is established.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::error::LedgerError;
use crate::types::{Order, Side, TradingPairId};

/// Read side of the ledger: resting orders for one pair and side.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn load_open_orders(
        &self,
        pair: TradingPairId,
        side: Side,
    ) -> Result<Vec<Order>, LedgerError>;
}

/// Resting orders for one pair at the moment they were read.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BookSnapshot {
    pub trading_pair_id: TradingPairId,
    pub bids: Vec<Order>,
    pub asks: Vec<Order>,
}

/// Price the order is willing to trade at. Market orders accept any price.
pub(crate) fn effective_limit(order: &Order) -> Decimal {
    match (order.side, order.is_market()) {
        (Side::Buy, true) => Decimal::MAX,
        (Side::Sell, true) => Decimal::ZERO,
        (_, false) => order.price,
    }
}

/// Price-time priority for one side: better price first, then earlier
/// `created_at`, then lower id.
pub fn priority_cmp(side: Side, a: &Order, b: &Order) -> Ordering {
    let by_price = match side {
        Side::Buy => effective_limit(b).cmp(&effective_limit(a)),
        Side::Sell => effective_limit(a).cmp(&effective_limit(b)),
    };
    by_price
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

impl BookSnapshot {
    /// Builds a snapshot from raw side lists. Drops orders that are not open,
    /// belong to another pair or side, or have nothing left; sorts the rest.
    pub fn from_orders(trading_pair_id: TradingPairId, bids: Vec<Order>, asks: Vec<Order>) -> Self {
        Self {
            trading_pair_id,
            bids: Self::prepare_side(trading_pair_id, Side::Buy, bids),
            asks: Self::prepare_side(trading_pair_id, Side::Sell, asks),
        }
    }

    fn prepare_side(pair: TradingPairId, side: Side, orders: Vec<Order>) -> Vec<Order> {
        let mut resting: Vec<Order> = orders
            .into_iter()
            .filter(|o| {
                o.trading_pair_id == pair
                    && o.side == side
                    && o.is_open()
                    && o.remaining_amount > Decimal::ZERO
            })
            .collect();
        resting.sort_by(|a, b| priority_cmp(side, a, b));
        resting
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Best bid limit price, if any limit bid rests.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().find(|o| o.is_limit()).map(|o| o.price)
    }

    /// Best ask limit price, if any limit ask rests.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().find(|o| o.is_limit()).map(|o| o.price)
    }
}

/// Loads both sides of the book for `pair`. Any read error aborts.
pub async fn load_book(
    source: &dyn OrderSource,
    pair: TradingPairId,
) -> Result<BookSnapshot, LedgerError> {
    let bids = source.load_open_orders(pair, Side::Buy).await?;
    let asks = source.load_open_orders(pair, Side::Sell).await?;
    Ok(BookSnapshot::from_orders(pair, bids, asks))
}

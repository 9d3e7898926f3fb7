//! Core types and IDs for the matching engine.
//!
//! All identifiers are newtype wrappers. [`Order`] is the limit order as the
//! ledger stores it; [`Side`], [`OrderType`] and [`OrderStatus`] define its
//! shape and lifecycle.

use rust_decimal::Decimal;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique order identifier, assigned by the ledger at placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

/// Account owner identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);

/// Trading pair (market) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TradingPairId(pub u64);

/// Executed trade identifier, assigned by the ledger on commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TradingPairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Order type: limit (rests at its price) or market (crosses at any price).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Open orders rest on the book and may still be matched or cancelled.
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }
}

/// A limit (or market) order as held by the ledger.
///
/// `remaining_amount == amount - filled_amount` at all times; only
/// [`Order::apply_fill`] and [`Order::cancel`] change quantity or status.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub trading_pair_id: TradingPairId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: OrderStatus,
    /// Fee percentage snapshotted from the pair's schedule at placement. Later
    /// schedule changes never touch it. `None` when the source keeps no snapshot;
    /// the pass's schedule applies to such orders.
    #[serde(default)]
    pub fee_percentage: Option<Decimal>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub filled_at: Option<u64>,
    #[serde(default)]
    pub canceled_at: Option<u64>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_limit(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    pub fn is_market(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    /// Moves `quantity` from remaining to filled and advances the status.
    ///
    /// Callers must have checked `quantity <= remaining_amount`.
    pub fn apply_fill(&mut self, quantity: Decimal, now: u64) {
        debug_assert!(quantity <= self.remaining_amount);
        self.filled_amount += quantity;
        self.remaining_amount = self.amount - self.filled_amount;
        self.updated_at = now;
        if self.remaining_amount.is_zero() {
            self.status = OrderStatus::Filled;
            self.filled_at = Some(now);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
    }

    /// Marks the order cancelled. Any filled portion stands.
    pub fn cancel(&mut self, now: u64) {
        self.status = OrderStatus::Cancelled;
        self.canceled_at = Some(now);
        self.updated_at = now;
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

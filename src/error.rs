//! Error types for the ledger boundary and the matching pass.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::types::{OrderId, OrderStatus, TradingPairId, UserId};

/// Failure reported by the ledger service (or by the call to it).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LedgerError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("trading pair {0} not found")]
    PairNotFound(TradingPairId),

    #[error("order {order} is not owned by user {user}")]
    NotOwner { order: OrderId, user: UserId },

    #[error("order {order} is no longer open (status {status:?})")]
    NotOpen { order: OrderId, status: OrderStatus },

    #[error("order {order} has {remaining} remaining, {requested} requested")]
    InsufficientRemaining {
        order: OrderId,
        remaining: Decimal,
        requested: Decimal,
    },

    #[error("user {user} has {available} {asset} available, {needed} needed")]
    InsufficientBalance {
        user: UserId,
        asset: String,
        available: Decimal,
        needed: Decimal,
    },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("invalid fee schedule for pair {pair}: {reason}")]
    InvalidFees { pair: TradingPairId, reason: String },

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("commit request does not match ledger state: {0}")]
    Mismatch(String),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    /// True for rejections decided by the ledger against current state, as
    /// opposed to failures reaching it.
    pub fn is_validation(&self) -> bool {
        !matches!(self, LedgerError::Transport(_) | LedgerError::Timeout(_))
    }

    /// True when a cancel lost to a fill: the order is already filled.
    pub fn is_too_late(&self) -> bool {
        matches!(
            self,
            LedgerError::NotOpen {
                status: OrderStatus::Filled,
                ..
            }
        )
    }
}

/// Failure inside one matching pass.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MatchError {
    /// Structural: the book could not be read. Nothing was committed.
    #[error("failed to load order book for pair {pair}: {source}")]
    BookLoad {
        pair: TradingPairId,
        #[source]
        source: LedgerError,
    },

    /// Structural: fees unknown, so no trade can be valued.
    #[error("failed to resolve fees for pair {pair}: {source}")]
    FeeResolution {
        pair: TradingPairId,
        #[source]
        source: LedgerError,
    },

    /// Per-execution: the ledger rejected or never saw the commit.
    #[error("commit of buy {buy_order_id} / sell {sell_order_id} for {amount} failed: {source}")]
    Commit {
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        amount: Decimal,
        #[source]
        source: LedgerError,
    },

    /// Per-execution: the crossing's value overflows, so it was never sent.
    #[error("cannot value buy {buy_order_id} / sell {sell_order_id} for {amount} at {price}: arithmetic overflow")]
    Valuation {
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        amount: Decimal,
        price: Decimal,
    },
}

impl MatchError {
    /// Structural errors abort the pass before any execution is proposed.
    pub fn is_structural(&self) -> bool {
        matches!(self, MatchError::BookLoad { .. } | MatchError::FeeResolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_late_only_for_filled() {
        let filled = LedgerError::NotOpen {
            order: OrderId(1),
            status: OrderStatus::Filled,
        };
        let cancelled = LedgerError::NotOpen {
            order: OrderId(1),
            status: OrderStatus::Cancelled,
        };
        assert!(filled.is_too_late());
        assert!(!cancelled.is_too_late());
        assert!(filled.is_validation());
    }

    #[test]
    fn transport_and_timeout_are_not_validation() {
        assert!(!LedgerError::Transport("reset".into()).is_validation());
        assert!(!LedgerError::Timeout(Duration::from_millis(5)).is_validation());
    }

    #[test]
    fn commit_error_message_names_both_orders() {
        let err = MatchError::Commit {
            buy_order_id: OrderId(7),
            sell_order_id: OrderId(9),
            amount: Decimal::from(3),
            source: LedgerError::OrderNotFound(OrderId(9)),
        };
        let msg = err.to_string();
        assert!(msg.contains("buy 7"));
        assert!(msg.contains("sell 9"));
        assert!(msg.contains("order 9 not found"));
        assert!(!err.is_structural());
    }
}

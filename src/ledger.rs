//! Contract of the external ledger service.
//!
//! The ledger is the system of record for balances and order state. The engine
//! only ever mutates it through two atomic primitives:
//!
//! - [`Ledger::commit_trade`] must, as one unit, re-check that both orders are
//!   still open with at least `amount` remaining, move `buyer_net` from the buyer
//!   and `seller_net` to the seller, update both orders, and record the trade.
//!   If any check fails nothing is applied.
//! - [`Ledger::cancel_order`] must, as one unit, check ownership and that the
//!   order is still open, refund whatever is reserved against the remainder,
//!   and mark it cancelled.
//!
//! Both re-derive truth from the ledger rather than from the caller's snapshot;
//! a commit and a cancel racing for the same last unit therefore resolve to a
//! single winner.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::matching::ProposedExecution;
use crate::types::{OrderId, TradeId, TradingPairId, UserId};

/// Arguments of the atomic commit primitive.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommitRequest {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub amount: Decimal,
    pub price: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub trading_pair_id: TradingPairId,
}

impl From<&ProposedExecution> for CommitRequest {
    fn from(execution: &ProposedExecution) -> Self {
        Self {
            buy_order_id: execution.buy_order_id,
            sell_order_id: execution.sell_order_id,
            amount: execution.amount,
            price: execution.price,
            buyer_fee: execution.fees.buyer_fee,
            seller_fee: execution.fees.seller_fee,
            buyer_id: execution.buyer_id,
            seller_id: execution.seller_id,
            trading_pair_id: execution.trading_pair_id,
        }
    }
}

/// Confirmation of a committed trade, with the ledger's post-commit remainders.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommitReceipt {
    pub trade_id: TradeId,
    pub executed_at: u64,
    pub buy_remaining: Decimal,
    pub sell_remaining: Decimal,
}

/// Confirmation of a cancellation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CancelReceipt {
    pub order_id: OrderId,
    /// Quantity that was still open when the order was cancelled.
    pub remaining_amount: Decimal,
    /// Asset and amount moved from locked back to available.
    pub refund_asset: String,
    pub refunded: Decimal,
    pub canceled_at: u64,
}

/// Write side of the ledger service.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn commit_trade(&self, request: &CommitRequest) -> Result<CommitReceipt, LedgerError>;

    async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<CancelReceipt, LedgerError>;
}

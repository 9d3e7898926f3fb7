//! Executed trades and matching-pass results.
//!
//! [`ExecutedTrade`] exists only once the ledger has committed it and is never
//! mutated. [`MatchingResult`] is the transient summary of one pass.

use rust_decimal::Decimal;

use crate::ledger::CommitReceipt;
use crate::matching::ProposedExecution;
use crate::types::{OrderId, TradeId, TradingPairId, UserId};

/// A committed crossing.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutedTrade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub trading_pair_id: TradingPairId,
    /// Maker (sell order) price.
    pub price: Decimal,
    pub amount: Decimal,
    pub total_value: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub buyer_net: Decimal,
    pub seller_net: Decimal,
    pub executed_at: u64,
}

impl ExecutedTrade {
    pub fn from_receipt(execution: &ProposedExecution, receipt: &CommitReceipt) -> Self {
        Self {
            id: receipt.trade_id,
            buy_order_id: execution.buy_order_id,
            sell_order_id: execution.sell_order_id,
            buyer_id: execution.buyer_id,
            seller_id: execution.seller_id,
            trading_pair_id: execution.trading_pair_id,
            price: execution.price,
            amount: execution.amount,
            total_value: execution.fees.total_value,
            buyer_fee: execution.fees.buyer_fee,
            seller_fee: execution.fees.seller_fee,
            buyer_net: execution.fees.buyer_net,
            seller_net: execution.fees.seller_net,
            executed_at: receipt.executed_at,
        }
    }
}

/// Summary of one matching pass.
///
/// `success` is false only when the pass could not start matching (book or fees
/// unavailable). Per-trade commit failures leave it true and land in `errors`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchingResult {
    pub success: bool,
    pub executed_trades: Vec<ExecutedTrade>,
    pub filled_buy_orders: Vec<OrderId>,
    pub filled_sell_orders: Vec<OrderId>,
    pub errors: Vec<String>,
}

impl MatchingResult {
    pub fn started() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// True when the pass completed and every proposed trade committed.
    pub fn is_clean(&self) -> bool {
        self.success && self.errors.is_empty()
    }

    pub fn traded_amount(&self) -> Decimal {
        self.executed_trades.iter().map(|t| t.amount).sum()
    }
}

//! Replays proposed executions against the ledger's atomic commit primitive.

use log::{debug, warn};
use std::time::Duration;

use crate::error::{LedgerError, MatchError};
use crate::execution::ExecutedTrade;
use crate::ledger::{CommitReceipt, CommitRequest, Ledger};
use crate::matching::ProposedExecution;

/// Commits one execution at a time, each bounded by `timeout`.
pub struct TradeCommitter<'a> {
    ledger: &'a dyn Ledger,
    timeout: Duration,
}

impl<'a> TradeCommitter<'a> {
    pub fn new(ledger: &'a dyn Ledger, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Submits `execution`. A timeout is reported like any other transport failure.
    pub async fn commit(
        &self,
        execution: &ProposedExecution,
    ) -> Result<(ExecutedTrade, CommitReceipt), MatchError> {
        let request = CommitRequest::from(execution);
        debug!(
            "commit attempt pair={} buy_order={} sell_order={} amount={} price={}",
            request.trading_pair_id,
            request.buy_order_id,
            request.sell_order_id,
            request.amount,
            request.price
        );
        let outcome = match tokio::time::timeout(self.timeout, self.ledger.commit_trade(&request)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.timeout)),
        };
        match outcome {
            Ok(receipt) => Ok((ExecutedTrade::from_receipt(execution, &receipt), receipt)),
            Err(source) => {
                warn!(
                    "commit rejected buy_order={} sell_order={} amount={} validation={} reason={}",
                    request.buy_order_id,
                    request.sell_order_id,
                    request.amount,
                    source.is_validation(),
                    source
                );
                Err(MatchError::Commit {
                    buy_order_id: request.buy_order_id,
                    sell_order_id: request.sell_order_id,
                    amount: request.amount,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeStructure;
    use crate::ledger::CancelReceipt;
    use crate::matching::Matcher;
    use crate::order_book::BookSnapshot;
    use crate::types::{Order, OrderId, OrderStatus, OrderType, Side, TradeId, TradingPairId, UserId};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    fn order(id: u64, side: Side, price: i64) -> Order {
        Order {
            id: OrderId(id),
            user_id: UserId(id),
            trading_pair_id: TradingPairId(1),
            side,
            order_type: OrderType::Limit,
            price: Decimal::from(price),
            amount: Decimal::from(10),
            filled_amount: Decimal::ZERO,
            remaining_amount: Decimal::from(10),
            status: OrderStatus::Pending,
            fee_percentage: None,
            created_at: id,
            updated_at: id,
            filled_at: None,
            canceled_at: None,
        }
    }

    fn execution() -> ProposedExecution {
        let snap = BookSnapshot::from_orders(
            TradingPairId(1),
            vec![order(1, Side::Buy, 100)],
            vec![order(2, Side::Sell, 100)],
        );
        let fees = FeeStructure::new(Decimal::new(6, 3), Decimal::new(11, 3));
        Matcher::new(&snap, fees).next_crossing().unwrap()
    }

    struct AcceptingLedger;

    #[async_trait]
    impl Ledger for AcceptingLedger {
        async fn commit_trade(&self, request: &CommitRequest) -> Result<CommitReceipt, LedgerError> {
            assert_eq!(request.buyer_fee, Decimal::from(6));
            assert_eq!(request.seller_fee, Decimal::from(11));
            Ok(CommitReceipt {
                trade_id: TradeId(77),
                executed_at: 1234,
                buy_remaining: Decimal::ZERO,
                sell_remaining: Decimal::ZERO,
            })
        }

        async fn cancel_order(&self, order_id: OrderId, _user_id: UserId) -> Result<CancelReceipt, LedgerError> {
            Err(LedgerError::OrderNotFound(order_id))
        }
    }

    struct StalledLedger;

    #[async_trait]
    impl Ledger for StalledLedger {
        async fn commit_trade(&self, _request: &CommitRequest) -> Result<CommitReceipt, LedgerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(LedgerError::Transport("unreachable".into()))
        }

        async fn cancel_order(&self, order_id: OrderId, _user_id: UserId) -> Result<CancelReceipt, LedgerError> {
            Err(LedgerError::OrderNotFound(order_id))
        }
    }

    #[tokio::test]
    async fn successful_commit_builds_trade_from_receipt() {
        let ledger = AcceptingLedger;
        let committer = TradeCommitter::new(&ledger, Duration::from_secs(1));
        let (trade, receipt) = committer.commit(&execution()).await.unwrap();
        assert_eq!(trade.id, TradeId(77));
        assert_eq!(trade.executed_at, 1234);
        assert_eq!(trade.total_value, Decimal::from(1000));
        assert_eq!(trade.buyer_net, Decimal::from(1006));
        assert_eq!(trade.seller_net, Decimal::from(989));
        assert!(receipt.buy_remaining.is_zero());
    }

    #[tokio::test]
    async fn stalled_ledger_times_out_as_commit_error() {
        let ledger = StalledLedger;
        let committer = TradeCommitter::new(&ledger, Duration::from_millis(20));
        let err = committer.commit(&execution()).await.unwrap_err();
        match err {
            MatchError::Commit { source, .. } => {
                assert_eq!(source, LedgerError::Timeout(Duration::from_millis(20)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

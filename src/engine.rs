//! Matching engine facade.
//!
//! One pass for one pair walks a fixed sequence of states:
//! [`PassState::LoadingBook`] → [`PassState::ResolvingFees`] → [`PassState::Matching`]
//! → [`PassState::Committing`] → [`PassState::Done`]. A failure while loading the
//! book or resolving fees jumps straight to `Done` with `success: false`. Commit
//! failures are collected and the pass carries on.
//!
//! The engine holds no lock across a pass and no state shared between pairs;
//! concurrent passes and cancels on the same pair are kept consistent by the
//! ledger's atomic primitives alone.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::canceller::OrderCanceller;
use crate::committer::TradeCommitter;
use crate::config::EngineConfig;
use crate::error::{LedgerError, MatchError};
use crate::execution::MatchingResult;
use crate::fees::{resolve_fees, FeeResolver, FeeStructure};
use crate::ledger::{CancelReceipt, Ledger};
use crate::matching::Matcher;
use crate::order_book::{load_book, BookSnapshot, OrderSource};
use crate::types::{OrderId, TradingPairId, UserId};

/// Stage of one matching pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    LoadingBook,
    ResolvingFees,
    Matching,
    Committing,
    Done,
}

/// Per-pair matching engine over an external ledger.
///
/// Cheap to clone; clones share the same ledger handles.
#[derive(Clone)]
pub struct MatchingEngine {
    orders: Arc<dyn OrderSource>,
    fees: Arc<dyn FeeResolver>,
    ledger: Arc<dyn Ledger>,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
}

impl MatchingEngine {
    /// Engine over a single service that reads the book, resolves fees and commits.
    pub fn new<T>(store: Arc<T>) -> Self
    where
        T: OrderSource + FeeResolver + Ledger + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store)
    }

    /// Engine over separate collaborators, e.g. a ledger plus an explicit fee table.
    pub fn from_parts(
        orders: Arc<dyn OrderSource>,
        fees: Arc<dyn FeeResolver>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            orders,
            fees,
            ledger,
            audit: Arc::new(NullAuditSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Runs one matching pass for `pair` with the pair's configured fees.
    pub async fn match_orders(&self, pair: TradingPairId) -> MatchingResult {
        self.run_pass(pair, None).await
    }

    /// Runs one matching pass for `pair` with caller-supplied fees.
    pub async fn match_orders_with_fees(&self, pair: TradingPairId, fees: FeeStructure) -> MatchingResult {
        self.run_pass(pair, Some(fees)).await
    }

    /// Matches independent pairs concurrently. Results come back sorted by pair.
    pub async fn match_pairs(&self, pairs: &[TradingPairId]) -> Vec<(TradingPairId, MatchingResult)> {
        let mut tasks = JoinSet::new();
        for &pair in pairs {
            let engine = self.clone();
            tasks.spawn(async move { (pair, engine.match_orders(pair).await) });
        }
        let mut results = Vec::with_capacity(pairs.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                Err(e) => warn!("match task failed error={}", e),
            }
        }
        results.sort_by_key(|(pair, _)| *pair);
        results
    }

    fn transition(pair: TradingPairId, state: &mut PassState, next: PassState) {
        debug!("match pass pair={} state={:?} -> {:?}", pair, state, next);
        *state = next;
    }

    async fn load(&self, pair: TradingPairId) -> Result<BookSnapshot, MatchError> {
        let timeout = self.config.io_timeout;
        match tokio::time::timeout(timeout, load_book(self.orders.as_ref(), pair)).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(source)) => Err(MatchError::BookLoad { pair, source }),
            Err(_) => Err(MatchError::BookLoad {
                pair,
                source: LedgerError::Timeout(timeout),
            }),
        }
    }

    async fn resolve(&self, pair: TradingPairId, supplied: Option<FeeStructure>) -> Result<FeeStructure, MatchError> {
        if let Some(fees) = supplied {
            return fees
                .validate(pair)
                .map(|_| fees)
                .map_err(|source| MatchError::FeeResolution { pair, source });
        }
        let timeout = self.config.io_timeout;
        match tokio::time::timeout(timeout, resolve_fees(self.fees.as_ref(), pair)).await {
            Ok(Ok(fees)) => Ok(fees),
            Ok(Err(source)) => Err(MatchError::FeeResolution { pair, source }),
            Err(_) => Err(MatchError::FeeResolution {
                pair,
                source: LedgerError::Timeout(timeout),
            }),
        }
    }

    fn abort(&self, pair: TradingPairId, state: &mut PassState, error: MatchError) -> MatchingResult {
        warn!("match pass aborted pair={} state={:?} error={}", pair, state, error);
        Self::transition(pair, state, PassState::Done);
        let result = MatchingResult::aborted(error.to_string());
        self.audit_pass(pair, &result);
        result
    }

    async fn run_pass(&self, pair: TradingPairId, supplied_fees: Option<FeeStructure>) -> MatchingResult {
        info!("match pass started pair={}", pair);
        let mut state = PassState::LoadingBook;

        let snapshot = match self.load(pair).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.abort(pair, &mut state, e),
        };

        Self::transition(pair, &mut state, PassState::ResolvingFees);
        let fees = match self.resolve(pair, supplied_fees).await {
            Ok(fees) => fees,
            Err(e) => return self.abort(pair, &mut state, e),
        };

        Self::transition(pair, &mut state, PassState::Matching);
        let mut matcher = Matcher::new(&snapshot, fees);
        debug!(
            "book loaded pair={} bids={} asks={} best_bid={:?} best_ask={:?}",
            pair,
            snapshot.bids.len(),
            snapshot.asks.len(),
            snapshot.best_bid(),
            snapshot.best_ask()
        );

        Self::transition(pair, &mut state, PassState::Committing);
        let committer = TradeCommitter::new(self.ledger.as_ref(), self.config.commit_timeout);
        let mut result = MatchingResult::started();
        while let Some(step) = matcher.next_step() {
            let execution = match step {
                Ok(execution) => execution,
                Err(e) => {
                    warn!("crossing not valued pair={} error={}", pair, e);
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            match committer.commit(&execution).await {
                Ok((trade, receipt)) => {
                    let outcome = matcher.reconcile(&execution, receipt.buy_remaining, receipt.sell_remaining);
                    info!(
                        "trade trade_id={} pair={} buy_order={} sell_order={} price={} amount={} buyer_fee={} seller_fee={}",
                        trade.id,
                        pair,
                        trade.buy_order_id,
                        trade.sell_order_id,
                        trade.price,
                        trade.amount,
                        trade.buyer_fee,
                        trade.seller_fee
                    );
                    if outcome.buy_filled {
                        result.filled_buy_orders.push(execution.buy_order_id);
                    }
                    if outcome.sell_filled {
                        result.filled_sell_orders.push(execution.sell_order_id);
                    }
                    result.executed_trades.push(trade);
                }
                Err(e) => result.errors.push(e.to_string()),
            }
        }

        Self::transition(pair, &mut state, PassState::Done);
        info!(
            "match pass completed pair={} trades={} traded={} errors={}",
            pair,
            result.executed_trades.len(),
            result.traded_amount(),
            result.errors.len()
        );
        self.audit_pass(pair, &result);
        result
    }

    fn audit_pass(&self, pair: TradingPairId, result: &MatchingResult) {
        let outcome = if !result.success {
            "error"
        } else if result.errors.is_empty() {
            "success"
        } else {
            "partial"
        };
        self.audit.emit(&AuditEvent::now(
            "engine",
            "match_pass",
            Some(serde_json::json!({
                "trading_pair_id": pair.0,
                "trades": result.executed_trades.len(),
                "errors": result.errors.len(),
            })),
            outcome,
        ));
    }

    /// Cancels an order, returning the ledger's typed reason on failure.
    pub async fn try_cancel_order(&self, order_id: OrderId, user_id: UserId) -> Result<CancelReceipt, LedgerError> {
        let canceller = OrderCanceller::new(self.ledger.as_ref(), self.config.commit_timeout);
        let outcome = canceller.cancel(order_id, user_id).await;
        let label = match &outcome {
            Ok(_) => "success",
            Err(e) if e.is_validation() => "rejected",
            Err(_) => "error",
        };
        self.audit.emit(&AuditEvent::now(
            user_id.0.to_string(),
            "order_cancel",
            Some(serde_json::json!({ "order_id": order_id.0 })),
            label,
        ));
        outcome
    }

    /// Cancels an order. Returns `true` if the ledger cancelled it.
    pub async fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> bool {
        self.try_cancel_order(order_id, user_id).await.is_ok()
    }
}

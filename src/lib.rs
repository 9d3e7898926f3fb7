//! # Pair Matching Engine
//!
//! Limit-order matching for a spot trading platform: one pass per trading pair loads
//! the open book, crosses it with price-time priority and commits each execution
//! through an atomic ledger, with fees charged to both sides.
//!
//! ## Entry point
//!
//! Use [`MatchingEngine`] as the single entry point: build it over a store that
//! implements [`OrderSource`], [`FeeResolver`] and [`Ledger`], then call
//! [`MatchingEngine::match_orders`] and [`MatchingEngine::cancel_order`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pair_matching_engine::{FeeStructure, InMemoryLedger, MatchingEngine, NewOrder, OrderType, Side, TradingPair, TradingPairId, UserId};
//! use rust_decimal::Decimal;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = Arc::new(InMemoryLedger::new());
//! ledger.add_pair(TradingPair {
//!     id: TradingPairId(1),
//!     symbol: "BTC-USD".into(),
//!     base_asset: "BTC".into(),
//!     quote_asset: "USD".into(),
//!     fees: FeeStructure::zero(),
//! }).unwrap();
//! ledger.deposit(UserId(1), "USD", Decimal::from(1000)).unwrap();
//! ledger.deposit(UserId(2), "BTC", Decimal::from(5)).unwrap();
//! for (user, side) in [(UserId(1), Side::Buy), (UserId(2), Side::Sell)] {
//!     ledger.place_order(NewOrder {
//!         user_id: user,
//!         trading_pair_id: TradingPairId(1),
//!         side,
//!         order_type: OrderType::Limit,
//!         price: Decimal::from(100),
//!         amount: Decimal::from(2),
//!     }).unwrap();
//! }
//!
//! let engine = MatchingEngine::new(ledger.clone());
//! let result = engine.match_orders(TradingPairId(1)).await;
//! assert!(result.success);
//! assert_eq!(result.executed_trades.len(), 1);
//! assert_eq!(ledger.balance(UserId(1), "BTC").available, Decimal::from(2));
//! # });
//! ```
//!
//! ## Lower-level API
//!
//! [`match_book`] crosses a [`BookSnapshot`] without touching any ledger, which is
//! useful for previews and tests.

pub mod api;
pub mod audit;
pub mod book_gen;
pub mod canceller;
pub mod committer;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fees;
pub mod ledger;
pub mod matching;
pub mod memory;
pub mod order_book;
pub mod persistence;
pub mod types;

pub use engine::MatchingEngine;
pub use error::{LedgerError, MatchError};
pub use execution::{ExecutedTrade, MatchingResult};
pub use fees::{FeeQuote, FeeResolver, FeeStructure, FeeTable};
pub use ledger::{CancelReceipt, CommitReceipt, CommitRequest, Ledger};
pub use matching::{match_book, MatchPlan, Matcher, ProposedExecution};
pub use memory::{Balance, InMemoryLedger, NewOrder, TradingPair};
pub use order_book::{BookSnapshot, OrderSource};
pub use types::{Order, OrderId, OrderStatus, OrderType, Side, TradeId, TradingPairId, UserId};

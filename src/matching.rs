//! Price-time priority matching over a snapshot of one pair's book.
//!
//! The scan is buy-initiated: bids are visited best first, and each bid walks the
//! asks best first, taking `min(bid.remaining, ask.remaining)` from every ask it
//! crosses. The execution price is the sell order's price (maker price). A later
//! bid rescans from the best ask, so liquidity an earlier bid left on a partially
//! filled ask is still available to it.
//!
//! All state lives in a [`WorkingBook`], a local copy of the snapshot. It only
//! changes through [`Matcher::confirm`]; a rejected step is simply never
//! confirmed. Nothing here performs I/O. The one step that can go wrong is
//! valuing a crossing whose notional overflows `Decimal`; [`Matcher::next_step`]
//! reports it as an error step and moves on.

use rust_decimal::Decimal;

use log::warn;

use crate::error::MatchError;
use crate::fees::{FeeQuote, FeeStructure};
use crate::order_book::{effective_limit, BookSnapshot};
use crate::types::{Order, OrderId, OrderType, TradingPairId, UserId};

/// Local, optimistic copy of one resting order.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkingOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_type: OrderType,
    pub price: Decimal,
    /// Effective limit: the price for limits, unbounded for market orders.
    pub limit: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    /// Rate snapshotted at placement, if the source kept one.
    pub fee_percentage: Option<Decimal>,
}

impl WorkingOrder {
    fn from_order(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            order_type: order.order_type,
            price: order.price,
            limit: effective_limit(order),
            amount: order.amount,
            filled: order.filled_amount,
            remaining: order.remaining_amount,
            fee_percentage: order.fee_percentage,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= Decimal::ZERO
    }

    fn is_limit(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    fn fill(&mut self, quantity: Decimal) {
        self.filled += quantity;
        self.remaining -= quantity;
    }
}

/// Working copy of both sides, in snapshot order.
#[derive(Clone, Debug)]
pub struct WorkingBook {
    pub trading_pair_id: TradingPairId,
    pub bids: Vec<WorkingOrder>,
    pub asks: Vec<WorkingOrder>,
}

impl WorkingBook {
    pub fn from_snapshot(snapshot: &BookSnapshot) -> Self {
        Self {
            trading_pair_id: snapshot.trading_pair_id,
            bids: snapshot.bids.iter().map(WorkingOrder::from_order).collect(),
            asks: snapshot.asks.iter().map(WorkingOrder::from_order).collect(),
        }
    }

    pub fn bid(&self, id: OrderId) -> Option<&WorkingOrder> {
        self.bids.iter().find(|o| o.id == id)
    }

    pub fn ask(&self, id: OrderId) -> Option<&WorkingOrder> {
        self.asks.iter().find(|o| o.id == id)
    }
}

/// One crossing the scan wants to trade. Each leg is valued at its order's
/// snapshotted fee, or at the pass's schedule when the order has none.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProposedExecution {
    pub trading_pair_id: TradingPairId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Decimal,
    pub price: Decimal,
    pub fees: FeeQuote,
    #[serde(skip)]
    bid_index: usize,
    #[serde(skip)]
    ask_index: usize,
}

/// Which side(s) a confirmed execution exhausted in the working copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillOutcome {
    pub buy_filled: bool,
    pub sell_filled: bool,
}

enum Crossing {
    At(Decimal),
    /// Prices cross but there is no maker price (market against market).
    Unpriced,
    None,
}

fn crossing(bid: &WorkingOrder, ask: &WorkingOrder) -> Crossing {
    if bid.limit < ask.limit {
        return Crossing::None;
    }
    if ask.is_limit() {
        Crossing::At(ask.price)
    } else if bid.is_limit() {
        Crossing::At(bid.price)
    } else {
        Crossing::Unpriced
    }
}

/// Step-wise scan over a [`WorkingBook`].
///
/// Call [`Matcher::next_step`] (or [`Matcher::next_crossing`]) for the next
/// proposal, then either [`Matcher::confirm`] it or drop it. The cursor
/// advances either way.
#[derive(Clone, Debug)]
pub struct Matcher {
    book: WorkingBook,
    fees: FeeStructure,
    bid_cursor: usize,
    ask_cursor: usize,
}

impl Matcher {
    pub fn new(snapshot: &BookSnapshot, fees: FeeStructure) -> Self {
        Self {
            book: WorkingBook::from_snapshot(snapshot),
            fees,
            bid_cursor: 0,
            ask_cursor: 0,
        }
    }

    pub fn book(&self) -> &WorkingBook {
        &self.book
    }

    pub fn into_book(self) -> WorkingBook {
        self.book
    }

    fn advance_bid(&mut self) {
        self.bid_cursor += 1;
        self.ask_cursor = 0;
    }

    /// Next step in price-time order, or `None` when the scan is done. A crossing
    /// that cannot be valued comes back as `Err` and is never confirmed.
    pub fn next_step(&mut self) -> Option<Result<ProposedExecution, MatchError>> {
        loop {
            let bid = self.book.bids.get(self.bid_cursor)?.clone();
            if bid.is_exhausted() {
                self.advance_bid();
                continue;
            }
            while let Some(ask) = self.book.asks.get(self.ask_cursor) {
                let ask_index = self.ask_cursor;
                if ask.is_exhausted() {
                    self.ask_cursor += 1;
                    continue;
                }
                let price = match crossing(&bid, ask) {
                    Crossing::At(price) => price,
                    Crossing::Unpriced => {
                        self.ask_cursor += 1;
                        continue;
                    }
                    // asks are sorted, nothing further can cross this bid
                    Crossing::None => break,
                };
                let amount = bid.remaining.min(ask.remaining);
                let rates = self.fees.for_legs(bid.fee_percentage, ask.fee_percentage);
                let quote = rates.quote(amount, price);
                let (sell_order_id, seller_id) = (ask.id, ask.user_id);
                self.ask_cursor += 1;
                let Some(fees) = quote else {
                    return Some(Err(MatchError::Valuation {
                        buy_order_id: bid.id,
                        sell_order_id,
                        amount,
                        price,
                    }));
                };
                return Some(Ok(ProposedExecution {
                    trading_pair_id: self.book.trading_pair_id,
                    buy_order_id: bid.id,
                    sell_order_id,
                    buyer_id: bid.user_id,
                    seller_id,
                    amount,
                    price,
                    fees,
                    bid_index: self.bid_cursor,
                    ask_index,
                }));
            }
            self.advance_bid();
        }
    }

    /// Next crossing that can be valued, skipping (and logging) any that cannot.
    pub fn next_crossing(&mut self) -> Option<ProposedExecution> {
        loop {
            match self.next_step()? {
                Ok(execution) => return Some(execution),
                Err(e) => warn!("crossing skipped error={}", e),
            }
        }
    }

    /// Applies a committed execution to the working copy.
    pub fn confirm(&mut self, execution: &ProposedExecution) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        if let Some(bid) = self.book.bids.get_mut(execution.bid_index) {
            debug_assert_eq!(bid.id, execution.buy_order_id);
            let quantity = execution.amount.min(bid.remaining);
            bid.fill(quantity);
            outcome.buy_filled = bid.is_exhausted();
        }
        if let Some(ask) = self.book.asks.get_mut(execution.ask_index) {
            debug_assert_eq!(ask.id, execution.sell_order_id);
            let quantity = execution.amount.min(ask.remaining);
            ask.fill(quantity);
            outcome.sell_filled = ask.is_exhausted();
        }
        outcome
    }

    /// Applies a committed execution, then overwrites both remainders with the
    /// ledger's post-commit values, which win over the local copy.
    pub fn reconcile(
        &mut self,
        execution: &ProposedExecution,
        buy_remaining: Decimal,
        sell_remaining: Decimal,
    ) -> FillOutcome {
        self.confirm(execution);
        let mut outcome = FillOutcome::default();
        if let Some(bid) = self.book.bids.get_mut(execution.bid_index) {
            bid.remaining = buy_remaining.max(Decimal::ZERO);
            bid.filled = bid.amount - bid.remaining;
            outcome.buy_filled = bid.is_exhausted();
        }
        if let Some(ask) = self.book.asks.get_mut(execution.ask_index) {
            ask.remaining = sell_remaining.max(Decimal::ZERO);
            ask.filled = ask.amount - ask.remaining;
            outcome.sell_filled = ask.is_exhausted();
        }
        outcome
    }
}

/// Result of matching a whole snapshot assuming every step commits.
#[derive(Clone, Debug)]
pub struct MatchPlan {
    pub executions: Vec<ProposedExecution>,
    pub filled_buy_orders: Vec<OrderId>,
    pub filled_sell_orders: Vec<OrderId>,
    pub book: WorkingBook,
}

/// Computes every crossing in `snapshot` under `fees`. Pure.
pub fn match_book(snapshot: &BookSnapshot, fees: FeeStructure) -> MatchPlan {
    let mut matcher = Matcher::new(snapshot, fees);
    let mut executions = Vec::new();
    let mut filled_buy_orders = Vec::new();
    let mut filled_sell_orders = Vec::new();
    while let Some(execution) = matcher.next_crossing() {
        let outcome = matcher.confirm(&execution);
        if outcome.buy_filled {
            filled_buy_orders.push(execution.buy_order_id);
        }
        if outcome.sell_filled {
            filled_sell_orders.push(execution.sell_order_id);
        }
        executions.push(execution);
    }
    MatchPlan {
        executions,
        filled_buy_orders,
        filled_sell_orders,
        book: matcher.into_book(),
    }
}

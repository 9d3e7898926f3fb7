//! In-memory reference ledger.
//!
//! Implements [`OrderSource`], [`FeeResolver`] and [`Ledger`] over one mutex-guarded
//! state. Every primitive runs entirely inside the lock and validates against the
//! stored orders before touching anything, which gives commits and cancels
//! compare-and-swap semantics on `remaining_amount`.
//!
//! Placement reserves funds: a limit buy locks `amount × price × (1 + fee)` of the
//! quote asset, a sell locks `amount` of the base asset. The fee percentage is
//! snapshotted onto the order, and a commit may not charge either side more than
//! its snapshot allows, so the reservation always covers the buyer's bill.
//! Settlement releases the matched share of that reservation, charges
//! `buyer_net`, pays `seller_net`, and books both fees as platform income.
//! Cancellation releases the rest. All arithmetic is checked; an order whose
//! value does not fit a `Decimal` is refused at placement.

use async_trait::async_trait;
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::LedgerError;
use crate::execution::ExecutedTrade;
use crate::fees::{FeeResolver, FeeStructure};
use crate::ledger::{CancelReceipt, CommitReceipt, CommitRequest, Ledger};
use crate::order_book::OrderSource;
use crate::types::{
    now_millis, Order, OrderId, OrderStatus, OrderType, Side, TradeId, TradingPairId, UserId,
};

/// A market and its fee schedule.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradingPair {
    pub id: TradingPairId,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub fees: FeeStructure,
}

/// One user's holding of one asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}

/// Placement request.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub trading_pair_id: TradingPairId,
    pub side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Decimal,
    pub amount: Decimal,
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct OrderRecord {
    order: Order,
    /// Locked funds per unit of remaining amount, in the order's refund asset.
    reserved_per_unit: Decimal,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct BalanceEntry {
    user_id: UserId,
    asset: String,
    balance: Balance,
}

/// Serializable copy of the whole ledger.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LedgerSnapshot {
    pairs: Vec<TradingPair>,
    balances: Vec<BalanceEntry>,
    orders: Vec<OrderRecord>,
    trades: Vec<ExecutedTrade>,
    fee_income: Vec<(String, Decimal)>,
    next_order_id: u64,
    next_trade_id: u64,
    last_timestamp: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    pairs: HashMap<TradingPairId, TradingPair>,
    balances: HashMap<(UserId, String), Balance>,
    orders: HashMap<OrderId, OrderRecord>,
    trades: Vec<ExecutedTrade>,
    fee_income: HashMap<String, Decimal>,
    next_order_id: u64,
    next_trade_id: u64,
    last_timestamp: u64,
}

impl LedgerState {
    /// Strictly increasing timestamp so placement order is total.
    fn tick(&mut self) -> u64 {
        let now = now_millis().max(self.last_timestamp + 1);
        self.last_timestamp = now;
        now
    }

    fn balance_mut(&mut self, user: UserId, asset: &str) -> &mut Balance {
        self.balances.entry((user, asset.to_string())).or_default()
    }

    fn balance(&self, user: UserId, asset: &str) -> Balance {
        self.balances
            .get(&(user, asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn pair(&self, id: TradingPairId) -> Result<&TradingPair, LedgerError> {
        self.pairs.get(&id).ok_or(LedgerError::PairNotFound(id))
    }

    fn record(&self, id: OrderId) -> Result<&OrderRecord, LedgerError> {
        self.orders.get(&id).ok_or(LedgerError::OrderNotFound(id))
    }

    fn check_leg(
        record: &OrderRecord,
        side: Side,
        user: UserId,
        pair: TradingPairId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let order = &record.order;
        if order.side != side || order.user_id != user || order.trading_pair_id != pair {
            return Err(LedgerError::Mismatch(format!(
                "order {} is {:?} by user {} on pair {}",
                order.id, order.side, order.user_id, order.trading_pair_id
            )));
        }
        if !order.is_open() {
            return Err(LedgerError::NotOpen {
                order: order.id,
                status: order.status,
            });
        }
        if order.remaining_amount < amount {
            return Err(LedgerError::InsufficientRemaining {
                order: order.id,
                remaining: order.remaining_amount,
                requested: amount,
            });
        }
        Ok(())
    }
}

/// Mutex-guarded ledger used by the binary, tests and benches.
#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                next_order_id: 1,
                next_trade_id: 1,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers (or replaces) a trading pair.
    pub fn add_pair(&self, pair: TradingPair) -> Result<(), LedgerError> {
        pair.fees.validate(pair.id)?;
        info!(
            "pair registered pair={} symbol={} buy_fee={} sell_fee={}",
            pair.id, pair.symbol, pair.fees.buy_fee_percentage, pair.fees.sell_fee_percentage
        );
        self.state().pairs.insert(pair.id, pair);
        Ok(())
    }

    /// Replaces a pair's fee schedule. Resting orders keep their snapshotted percentage.
    pub fn set_fees(&self, pair: TradingPairId, fees: FeeStructure) -> Result<(), LedgerError> {
        fees.validate(pair)?;
        let mut state = self.state();
        let entry = state.pairs.get_mut(&pair).ok_or(LedgerError::PairNotFound(pair))?;
        entry.fees = fees;
        Ok(())
    }

    pub fn pairs(&self) -> Vec<TradingPair> {
        let mut pairs: Vec<TradingPair> = self.state().pairs.values().cloned().collect();
        pairs.sort_by_key(|p| p.id);
        pairs
    }

    /// Credits `amount` of `asset` to the user's available balance.
    pub fn deposit(&self, user: UserId, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!("deposit amount {} must be positive", amount)));
        }
        let mut state = self.state();
        let held = state.balance_mut(user, asset);
        held.available = held
            .available
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(format!("deposit of {} {} for user {}", amount, asset, user)))?;
        Ok(())
    }

    pub fn balance(&self, user: UserId, asset: &str) -> Balance {
        self.state().balance(user, asset)
    }

    /// Sum over all users (available + locked) plus fee income, for one asset.
    pub fn total_supply(&self, asset: &str) -> Decimal {
        let state = self.state();
        let held: Decimal = state
            .balances
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, b)| b.total())
            .sum();
        held + state.fee_income.get(asset).copied().unwrap_or_default()
    }

    pub fn fee_income(&self, asset: &str) -> Decimal {
        self.state().fee_income.get(asset).copied().unwrap_or_default()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state().orders.get(&id).map(|r| r.order.clone())
    }

    pub fn trades(&self) -> Vec<ExecutedTrade> {
        self.state().trades.clone()
    }

    /// Places an order atomically: validates it, reserves funds and snapshots
    /// the pair's fee percentage onto it.
    pub fn place_order(&self, request: NewOrder) -> Result<Order, LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!("amount {} must be positive", request.amount)));
        }
        let is_limit = matches!(request.order_type, OrderType::Limit);
        if is_limit && request.price <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!("limit price {} must be positive", request.price)));
        }
        let mut state = self.state();
        let pair = state.pair(request.trading_pair_id)?.clone();
        let oversize = || {
            LedgerError::InvalidOrder(format!(
                "{} at {} is too large to value",
                request.amount, request.price
            ))
        };
        let (fee_percentage, asset, reserved_per_unit) = match request.side {
            Side::Buy => {
                let fee = pair.fees.buy_fee_percentage;
                let per_unit = if is_limit {
                    request.price.checked_mul(Decimal::ONE + fee).ok_or_else(oversize)?
                } else {
                    Decimal::ZERO
                };
                (fee, pair.quote_asset.clone(), per_unit)
            }
            Side::Sell => (pair.fees.sell_fee_percentage, pair.base_asset.clone(), Decimal::ONE),
        };
        if is_limit {
            // the whole order must be valuable with both fees on top
            pair.fees.quote(request.amount, request.price).ok_or_else(oversize)?;
        }
        let reserve = request.amount.checked_mul(reserved_per_unit).ok_or_else(oversize)?;
        let balance = state.balance(request.user_id, &asset);
        if balance.available < reserve {
            return Err(LedgerError::InsufficientBalance {
                user: request.user_id,
                asset,
                available: balance.available,
                needed: reserve,
            });
        }
        let held = state.balance_mut(request.user_id, &asset);
        held.available -= reserve;
        held.locked += reserve;

        let now = state.tick();
        let id = OrderId(state.next_order_id);
        state.next_order_id += 1;
        let order = Order {
            id,
            user_id: request.user_id,
            trading_pair_id: request.trading_pair_id,
            side: request.side,
            order_type: request.order_type,
            price: if is_limit { request.price } else { Decimal::ZERO },
            amount: request.amount,
            filled_amount: Decimal::ZERO,
            remaining_amount: request.amount,
            status: OrderStatus::Pending,
            fee_percentage: Some(fee_percentage),
            created_at: now,
            updated_at: now,
            filled_at: None,
            canceled_at: None,
        };
        state.orders.insert(
            id,
            OrderRecord {
                order: order.clone(),
                reserved_per_unit,
            },
        );
        info!(
            "order placed order_id={} user_id={} pair={} side={:?} type={:?} price={} amount={} reserved={} {}",
            id, order.user_id, order.trading_pair_id, order.side, order.order_type, order.price, order.amount, reserve, asset
        );
        Ok(order)
    }

    /// Serializable copy of all state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state();
        let mut orders: Vec<OrderRecord> = state.orders.values().cloned().collect();
        orders.sort_by_key(|r| r.order.id);
        let mut balances: Vec<BalanceEntry> = state
            .balances
            .iter()
            .map(|((user_id, asset), balance)| BalanceEntry {
                user_id: *user_id,
                asset: asset.clone(),
                balance: *balance,
            })
            .collect();
        balances.sort_by(|a, b| (a.user_id, &a.asset).cmp(&(b.user_id, &b.asset)));
        let mut pairs: Vec<TradingPair> = state.pairs.values().cloned().collect();
        pairs.sort_by_key(|p| p.id);
        let mut fee_income: Vec<(String, Decimal)> =
            state.fee_income.iter().map(|(a, v)| (a.clone(), *v)).collect();
        fee_income.sort();
        LedgerSnapshot {
            pairs,
            balances,
            orders,
            trades: state.trades.clone(),
            fee_income,
            next_order_id: state.next_order_id,
            next_trade_id: state.next_trade_id,
            last_timestamp: state.last_timestamp,
        }
    }

    /// Rebuilds a ledger from a snapshot.
    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        let state = LedgerState {
            pairs: snapshot.pairs.into_iter().map(|p| (p.id, p)).collect(),
            balances: snapshot
                .balances
                .into_iter()
                .map(|e| ((e.user_id, e.asset), e.balance))
                .collect(),
            orders: snapshot.orders.into_iter().map(|r| (r.order.id, r)).collect(),
            trades: snapshot.trades,
            fee_income: snapshot.fee_income.into_iter().collect(),
            next_order_id: snapshot.next_order_id.max(1),
            next_trade_id: snapshot.next_trade_id.max(1),
            last_timestamp: snapshot.last_timestamp,
        };
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl OrderSource for InMemoryLedger {
    async fn load_open_orders(
        &self,
        pair: TradingPairId,
        side: Side,
    ) -> Result<Vec<Order>, LedgerError> {
        let state = self.state();
        state.pair(pair)?;
        Ok(state
            .orders
            .values()
            .map(|r| &r.order)
            .filter(|o| o.trading_pair_id == pair && o.side == side && o.is_open())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeeResolver for InMemoryLedger {
    async fn fee_schedule(&self, pair: TradingPairId) -> Result<FeeStructure, LedgerError> {
        Ok(self.state().pair(pair)?.fees)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn commit_trade(&self, request: &CommitRequest) -> Result<CommitReceipt, LedgerError> {
        let mut state = self.state();
        let pair = state.pair(request.trading_pair_id)?.clone();
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::Mismatch(format!("amount {} must be positive", request.amount)));
        }
        if request.buyer_fee.is_sign_negative() || request.seller_fee.is_sign_negative() {
            return Err(LedgerError::Mismatch("fees must not be negative".into()));
        }

        // Re-validate both legs against current state, not the caller's snapshot.
        let buy = state.record(request.buy_order_id)?.clone();
        let sell = state.record(request.sell_order_id)?.clone();
        LedgerState::check_leg(&buy, Side::Buy, request.buyer_id, pair.id, request.amount)?;
        LedgerState::check_leg(&sell, Side::Sell, request.seller_id, pair.id, request.amount)?;
        if buy.order.is_limit() && request.price > buy.order.price {
            return Err(LedgerError::Mismatch(format!(
                "price {} above buy limit {}",
                request.price, buy.order.price
            )));
        }
        if sell.order.is_limit() && request.price < sell.order.price {
            return Err(LedgerError::Mismatch(format!(
                "price {} below sell limit {}",
                request.price, sell.order.price
            )));
        }

        let overflow = |what: &str| {
            LedgerError::Overflow(format!(
                "{} for buy {} / sell {}",
                what, request.buy_order_id, request.sell_order_id
            ))
        };
        let total_value = request
            .amount
            .checked_mul(request.price)
            .ok_or_else(|| overflow("trade value"))?;
        for (leg, fee, snapshot) in [
            ("buyer", request.buyer_fee, buy.order.fee_percentage),
            ("seller", request.seller_fee, sell.order.fee_percentage),
        ] {
            if let Some(rate) = snapshot {
                let allowed = total_value.checked_mul(rate).ok_or_else(|| overflow("fee"))?;
                if fee > allowed {
                    return Err(LedgerError::Mismatch(format!(
                        "{} fee {} exceeds {} allowed by the snapshotted rate {}",
                        leg, fee, allowed, rate
                    )));
                }
            }
        }
        let buyer_net = total_value
            .checked_add(request.buyer_fee)
            .ok_or_else(|| overflow("buyer net"))?;
        let seller_net = total_value - request.seller_fee;
        let fee_total = request.buyer_fee + request.seller_fee;
        let release = request
            .amount
            .checked_mul(buy.reserved_per_unit)
            .ok_or_else(|| overflow("buyer reservation"))?;
        let buyer_quote = state.balance(request.buyer_id, &pair.quote_asset);
        let buyer_funds = buyer_quote
            .available
            .checked_add(release)
            .ok_or_else(|| overflow("buyer funds"))?;
        if buyer_funds < buyer_net {
            return Err(LedgerError::InsufficientBalance {
                user: request.buyer_id,
                asset: pair.quote_asset.clone(),
                available: buyer_funds,
                needed: buyer_net,
            });
        }
        state
            .balance(request.buyer_id, &pair.base_asset)
            .available
            .checked_add(request.amount)
            .ok_or_else(|| overflow("buyer base balance"))?;
        state
            .balance(request.seller_id, &pair.quote_asset)
            .available
            .checked_add(seller_net)
            .ok_or_else(|| overflow("seller quote balance"))?;
        state
            .fee_income
            .get(&pair.quote_asset)
            .copied()
            .unwrap_or_default()
            .checked_add(fee_total)
            .ok_or_else(|| overflow("fee income"))?;

        // All checks passed; apply as one unit.
        let now = state.tick();
        {
            let quote = state.balance_mut(request.buyer_id, &pair.quote_asset);
            quote.locked -= release;
            quote.available += release - buyer_net;
        }
        state.balance_mut(request.buyer_id, &pair.base_asset).available += request.amount;
        state.balance_mut(request.seller_id, &pair.base_asset).locked -= request.amount * sell.reserved_per_unit;
        state.balance_mut(request.seller_id, &pair.quote_asset).available += seller_net;
        *state.fee_income.entry(pair.quote_asset.clone()).or_default() += fee_total;

        let mut buy_remaining = Decimal::ZERO;
        let mut sell_remaining = Decimal::ZERO;
        if let Some(record) = state.orders.get_mut(&request.buy_order_id) {
            record.order.apply_fill(request.amount, now);
            buy_remaining = record.order.remaining_amount;
        }
        if let Some(record) = state.orders.get_mut(&request.sell_order_id) {
            record.order.apply_fill(request.amount, now);
            sell_remaining = record.order.remaining_amount;
        }

        let trade_id = TradeId(state.next_trade_id);
        state.next_trade_id += 1;
        state.trades.push(ExecutedTrade {
            id: trade_id,
            buy_order_id: request.buy_order_id,
            sell_order_id: request.sell_order_id,
            buyer_id: request.buyer_id,
            seller_id: request.seller_id,
            trading_pair_id: pair.id,
            price: request.price,
            amount: request.amount,
            total_value,
            buyer_fee: request.buyer_fee,
            seller_fee: request.seller_fee,
            buyer_net,
            seller_net,
            executed_at: now,
        });
        Ok(CommitReceipt {
            trade_id,
            executed_at: now,
            buy_remaining,
            sell_remaining,
        })
    }

    async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<CancelReceipt, LedgerError> {
        let mut state = self.state();
        let record = state.record(order_id)?.clone();
        if record.order.user_id != user_id {
            return Err(LedgerError::NotOwner {
                order: order_id,
                user: user_id,
            });
        }
        if !record.order.is_open() {
            return Err(LedgerError::NotOpen {
                order: order_id,
                status: record.order.status,
            });
        }
        let pair = state.pair(record.order.trading_pair_id)?.clone();
        let refund_asset = match record.order.side {
            Side::Buy => pair.quote_asset,
            Side::Sell => pair.base_asset,
        };
        let refunded = record.order.remaining_amount * record.reserved_per_unit;
        let now = state.tick();
        {
            let held = state.balance_mut(user_id, &refund_asset);
            held.locked -= refunded;
            held.available += refunded;
        }
        if let Some(r) = state.orders.get_mut(&order_id) {
            r.order.cancel(now);
        }
        Ok(CancelReceipt {
            order_id,
            remaining_amount: record.order.remaining_amount,
            refund_asset,
            refunded,
            canceled_at: now,
        })
    }
}

//! Fee schedules and fee arithmetic.
//!
//! Fees are always charged on notional value (`amount × price`): the buyer
//! pays value plus fee, the seller receives value minus fee.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::LedgerError;
use crate::types::TradingPairId;

/// Per-pair fee percentages, as fractions (0.006 = 0.6%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeeStructure {
    pub buy_fee_percentage: Decimal,
    pub sell_fee_percentage: Decimal,
}

/// Fee breakdown for one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeeQuote {
    pub total_value: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub buyer_net: Decimal,
    pub seller_net: Decimal,
}

impl FeeStructure {
    pub fn new(buy_fee_percentage: Decimal, sell_fee_percentage: Decimal) -> Self {
        Self {
            buy_fee_percentage,
            sell_fee_percentage,
        }
    }

    /// A schedule that charges nothing.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Both percentages must lie in `[0, 1)`.
    pub fn validate(&self, pair: TradingPairId) -> Result<(), LedgerError> {
        for (name, pct) in [
            ("buy_fee_percentage", self.buy_fee_percentage),
            ("sell_fee_percentage", self.sell_fee_percentage),
        ] {
            if pct.is_sign_negative() || pct >= Decimal::ONE {
                return Err(LedgerError::InvalidFees {
                    pair,
                    reason: format!("{} {} outside [0, 1)", name, pct),
                });
            }
        }
        Ok(())
    }

    /// The rates for one execution: each leg's snapshotted percentage, where the
    /// order carries one, wins over this schedule.
    pub fn for_legs(&self, buy_snapshot: Option<Decimal>, sell_snapshot: Option<Decimal>) -> Self {
        Self::new(
            buy_snapshot.unwrap_or(self.buy_fee_percentage),
            sell_snapshot.unwrap_or(self.sell_fee_percentage),
        )
    }

    /// Values `amount` at `price`. `None` if any figure overflows `Decimal`.
    pub fn quote(&self, amount: Decimal, price: Decimal) -> Option<FeeQuote> {
        let total_value = amount.checked_mul(price)?;
        let buyer_fee = total_value.checked_mul(self.buy_fee_percentage)?;
        let seller_fee = total_value.checked_mul(self.sell_fee_percentage)?;
        Some(FeeQuote {
            total_value,
            buyer_fee,
            seller_fee,
            buyer_net: total_value.checked_add(buyer_fee)?,
            seller_net: total_value.checked_sub(seller_fee)?,
        })
    }
}

/// Reads the fee schedule configured for a pair.
#[async_trait]
pub trait FeeResolver: Send + Sync {
    async fn fee_schedule(&self, pair: TradingPairId) -> Result<FeeStructure, LedgerError>;
}

/// Explicit fee configuration handed to the engine by the caller.
#[derive(Clone, Debug, Default)]
pub struct FeeTable {
    fees: HashMap<TradingPairId, FeeStructure>,
}

impl FeeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(mut self, pair: TradingPairId, fees: FeeStructure) -> Self {
        self.fees.insert(pair, fees);
        self
    }

    pub fn insert(&mut self, pair: TradingPairId, fees: FeeStructure) {
        self.fees.insert(pair, fees);
    }
}

#[async_trait]
impl FeeResolver for FeeTable {
    async fn fee_schedule(&self, pair: TradingPairId) -> Result<FeeStructure, LedgerError> {
        self.fees
            .get(&pair)
            .copied()
            .ok_or(LedgerError::PairNotFound(pair))
    }
}

/// Fetches and validates a pair's fees.
pub async fn resolve_fees(
    resolver: &dyn FeeResolver,
    pair: TradingPairId,
) -> Result<FeeStructure, LedgerError> {
    let fees = resolver.fee_schedule(pair).await?;
    fees.validate(pair)?;
    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> FeeStructure {
        FeeStructure::new(Decimal::new(6, 3), Decimal::new(11, 3))
    }

    #[test]
    fn fee_arithmetic_on_notional() {
        let q = schedule().quote(Decimal::from(10), Decimal::from(100)).unwrap();
        assert_eq!(q.total_value, Decimal::from(1000));
        assert_eq!(q.buyer_fee, Decimal::from(6));
        assert_eq!(q.seller_fee, Decimal::from(11));
        assert_eq!(q.buyer_net, Decimal::from(1006));
        assert_eq!(q.seller_net, Decimal::from(989));
    }

    #[test]
    fn fractional_amounts_stay_exact() {
        let q = schedule().quote(Decimal::new(15, 1), Decimal::new(2001, 2)).unwrap();
        // 1.5 * 20.01 = 30.015
        assert_eq!(q.total_value, Decimal::new(30015, 3));
        assert_eq!(q.buyer_net - q.total_value, q.buyer_fee);
        assert_eq!(q.total_value - q.seller_net, q.seller_fee);
    }

    #[test]
    fn overflowing_notional_has_no_quote() {
        assert_eq!(schedule().quote(Decimal::from(2), Decimal::MAX), None);
        // value fits, value plus fee does not
        assert_eq!(schedule().quote(Decimal::ONE, Decimal::MAX), None);
        assert!(FeeStructure::zero().quote(Decimal::ONE, Decimal::MAX).is_some());
    }

    #[test]
    fn snapshots_win_over_schedule() {
        let legs = schedule().for_legs(Some(Decimal::new(1, 3)), None);
        assert_eq!(legs.buy_fee_percentage, Decimal::new(1, 3));
        assert_eq!(legs.sell_fee_percentage, Decimal::new(11, 3));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let pair = TradingPairId(3);
        assert!(schedule().validate(pair).is_ok());
        assert!(FeeStructure::zero().validate(pair).is_ok());
        let negative = FeeStructure::new(Decimal::new(-1, 3), Decimal::ZERO);
        assert!(matches!(
            negative.validate(pair),
            Err(LedgerError::InvalidFees { .. })
        ));
        let whole = FeeStructure::new(Decimal::ZERO, Decimal::ONE);
        assert!(whole.validate(pair).is_err());
    }

    #[tokio::test]
    async fn fee_table_resolves_known_pair_only() {
        let table = FeeTable::new().with_pair(TradingPairId(1), schedule());
        assert_eq!(resolve_fees(&table, TradingPairId(1)).await, Ok(schedule()));
        assert_eq!(
            resolve_fees(&table, TradingPairId(2)).await,
            Err(LedgerError::PairNotFound(TradingPairId(2)))
        );
    }
}

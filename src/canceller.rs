//! Cancellation through the ledger's atomic cancel primitive.

use log::{info, warn};
use std::time::Duration;

use crate::error::LedgerError;
use crate::ledger::{CancelReceipt, Ledger};
use crate::types::{OrderId, UserId};

pub struct OrderCanceller<'a> {
    ledger: &'a dyn Ledger,
    timeout: Duration,
}

impl<'a> OrderCanceller<'a> {
    pub fn new(ledger: &'a dyn Ledger, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Cancels `order_id` on behalf of `user_id`, refunding the reserved remainder.
    pub async fn cancel(&self, order_id: OrderId, user_id: UserId) -> Result<CancelReceipt, LedgerError> {
        let outcome = match tokio::time::timeout(self.timeout, self.ledger.cancel_order(order_id, user_id)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.timeout)),
        };
        match &outcome {
            Ok(receipt) => info!(
                "order cancelled order_id={} user_id={} remaining={} refunded={} {}",
                order_id, user_id, receipt.remaining_amount, receipt.refunded, receipt.refund_asset
            ),
            Err(e) => warn!(
                "cancel rejected order_id={} user_id={} too_late={} reason={}",
                order_id,
                user_id,
                e.is_too_late(),
                e
            ),
        }
        outcome
    }
}

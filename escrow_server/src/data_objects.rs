use escrow_common::Money;
use escrow_engine::{
    db_types::{BankAccount, CommissionRecord, Order, OrderId, PayoutMethod, PayoutProfile},
    ReleaseResult,
    SweepFailure,
    SweepResult,
};
use serde::{Deserialize, Serialize};

/// The response to a manual release request.
///
/// A release that somebody else already completed is not an error from the caller's point of view: the seller has
/// been paid exactly once. In that case `already_released` is set and `reference` is whatever was recorded then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub order_id: OrderId,
    pub already_released: bool,
    pub method: Option<PayoutMethod>,
    pub reference: Option<String>,
    pub seller_amount: Money,
    pub commission: Option<CommissionRecord>,
}

impl From<ReleaseResult> for ReleaseResponse {
    fn from(result: ReleaseResult) -> Self {
        Self {
            order_id: result.order.order_id,
            already_released: false,
            method: Some(result.method),
            reference: Some(result.reference),
            seller_amount: result.order.seller_amount,
            commission: Some(result.commission),
        }
    }
}

impl ReleaseResponse {
    pub fn already_released(order: Order, commission: Option<CommissionRecord>) -> Self {
        Self {
            order_id: order.order_id,
            already_released: true,
            method: order.payment_method,
            reference: order.transfer_reference,
            seller_amount: order.seller_amount,
            commission,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub candidates: usize,
    pub released: Vec<OrderId>,
    pub skipped: Vec<OrderId>,
    pub failed: Vec<SweepFailure>,
    pub not_yet_due: usize,
}

impl From<SweepResult> for SweepSummary {
    fn from(result: SweepResult) -> Self {
        let not_yet_due = result.not_yet_due();
        Self { candidates: result.candidates, released: result.released, skipped: result.skipped, failed: result.failed, not_yet_due }
    }
}

/// A seller's payout details, as submitted by the seller. The seller id always comes from the access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutProfileRequest {
    #[serde(default)]
    pub bank: Option<BankAccount>,
    #[serde(default)]
    pub mobile_money_a: Option<String>,
    #[serde(default)]
    pub mobile_money_b: Option<String>,
    #[serde(default)]
    pub other_instructions: Option<String>,
}

impl PayoutProfileRequest {
    pub fn into_profile(self, seller_id: &str) -> PayoutProfile {
        PayoutProfile {
            seller_id: seller_id.to_string(),
            bank: self.bank,
            mobile_money_a: self.mobile_money_a,
            mobile_money_b: self.mobile_money_b,
            other_instructions: self.other_instructions,
            gateway_recipient_id: None,
        }
    }
}

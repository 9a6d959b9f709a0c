use async_trait::async_trait;
use log::*;

use crate::{
    db_types::{PayoutChannel, PayoutMethod},
    gateways::{reference_suffix, PayoutGateway, PayoutRequest, TransferError, TransferReceipt},
};

/// The escape hatch for sellers who can only be paid by hand.
///
/// Nothing is sent anywhere. The gateway records a `MANUAL-` reference so the order can be marked as released with an
/// audit trail, and logs that an operator has to complete the payout out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualGateway;

impl ManualGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PayoutGateway for ManualGateway {
    fn method(&self) -> PayoutMethod {
        PayoutMethod::Manual
    }

    async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError> {
        let PayoutChannel::Manual { instructions } = channel else {
            return Err(TransferError::InvalidChannel {
                method: PayoutMethod::Manual,
                reason: format!("Expected payout instructions, got {}", channel.method()),
            });
        };
        let reference = format!("MANUAL-{}-{}", request.order_id.as_str(), reference_suffix());
        warn!(
            "🏦 Manual payout of {} for order {} must be completed by an operator. Reference {reference}. Seller \
             instructions: {instructions}",
            request.amount, request.order_id
        );
        Ok(TransferReceipt::new(reference, PayoutMethod::Manual))
    }
}

use std::time::Duration;

use async_trait::async_trait;
use log::*;

use crate::{
    db_types::{PayoutChannel, PayoutMethod},
    gateways::{reference_suffix, with_timeout, PayoutGateway, PayoutRequest, TransferError, TransferReceipt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobileMoneyProvider {
    A,
    B,
}

impl MobileMoneyProvider {
    pub fn method(&self) -> PayoutMethod {
        match self {
            Self::A => PayoutMethod::MobileMoneyA,
            Self::B => PayoutMethod::MobileMoneyB,
        }
    }

    fn reference_prefix(&self) -> &'static str {
        match self {
            Self::A => "MMA",
            Self::B => "MMB",
        }
    }
}

/// Pays out to a mobile-money wallet identified by phone number.
///
/// There is no provider integration yet. The gateway checks that it was given a phone number for its own provider
/// and fabricates a reference. A real network call can replace [`MobileMoneyGateway::send`] without the release
/// engine noticing.
#[derive(Debug, Clone)]
pub struct MobileMoneyGateway {
    provider: MobileMoneyProvider,
    timeout: Duration,
}

impl MobileMoneyGateway {
    pub fn new(provider: MobileMoneyProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider(&self) -> MobileMoneyProvider {
        self.provider
    }

    fn phone_for<'a>(&self, channel: &'a PayoutChannel) -> Result<&'a str, TransferError> {
        let phone = match (self.provider, channel) {
            (MobileMoneyProvider::A, PayoutChannel::MobileMoneyA { phone }) => phone,
            (MobileMoneyProvider::B, PayoutChannel::MobileMoneyB { phone }) => phone,
            (_, other) => {
                return Err(TransferError::InvalidChannel {
                    method: self.method(),
                    reason: format!("Expected a {} number, got {}", self.method(), other.method()),
                })
            },
        };
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(TransferError::InvalidChannel { method: self.method(), reason: "No phone number".to_string() });
        }
        Ok(phone)
    }

    async fn send(&self, phone: &str, request: &PayoutRequest) -> Result<String, TransferError> {
        let reference = format!("{}-{}-{}", self.provider.reference_prefix(), request.order_id.as_str(), reference_suffix());
        info!("🏦 {} of {} to {phone} recorded as {reference}", self.method().description(), request.amount);
        Ok(reference)
    }
}

#[async_trait]
impl PayoutGateway for MobileMoneyGateway {
    fn method(&self) -> PayoutMethod {
        self.provider.method()
    }

    async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError> {
        let phone = self.phone_for(channel)?;
        if request.amount.is_zero() || request.amount.is_negative() {
            return Err(TransferError::InvalidAmount(format!("{} is not a positive amount", request.amount)));
        }
        let reference = with_timeout(self.timeout, self.send(phone, request)).await?;
        Ok(TransferReceipt::new(reference, self.method()))
    }
}

#[cfg(test)]
mod test {
    use escrow_common::Money;

    use super::*;

    fn gateway(provider: MobileMoneyProvider) -> MobileMoneyGateway {
        MobileMoneyGateway::new(provider, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn pays_to_own_provider() {
        let channel = PayoutChannel::MobileMoneyB { phone: " 08031234567 ".into() };
        let request = PayoutRequest::for_order(&"o9".into(), Money::from(25));
        let receipt = gateway(MobileMoneyProvider::B).transfer(&channel, &request).await.unwrap();
        assert_eq!(receipt.method, PayoutMethod::MobileMoneyB);
        assert!(receipt.reference.starts_with("MMB-o9-"));
        assert!(receipt.recipient_id.is_none());
    }

    #[tokio::test]
    async fn rejects_other_providers_numbers() {
        let channel = PayoutChannel::MobileMoneyB { phone: "0803".into() };
        let request = PayoutRequest::for_order(&"o9".into(), Money::from(25));
        let err = gateway(MobileMoneyProvider::A).transfer(&channel, &request).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidChannel { method: PayoutMethod::MobileMoneyA, .. }));
    }

    #[tokio::test]
    async fn rejects_blank_numbers_and_empty_amounts() {
        let request = PayoutRequest::for_order(&"o9".into(), Money::from(25));
        let blank = PayoutChannel::MobileMoneyA { phone: "  ".into() };
        assert!(gateway(MobileMoneyProvider::A).transfer(&blank, &request).await.is_err());
        let channel = PayoutChannel::MobileMoneyA { phone: "0802".into() };
        let zero = PayoutRequest::for_order(&"o9".into(), Money::from(0));
        let err = gateway(MobileMoneyProvider::A).transfer(&channel, &zero).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
    }
}

use escrow_engine::{
    db_types::{PayoutChannel, PayoutMethod},
    gateways::{PayoutGateway, PayoutRequest, TransferError, TransferReceipt},
};
use mockall::mock;

mock! {
    pub Gateway {}

    #[async_trait::async_trait]
    impl PayoutGateway for Gateway {
        fn method(&self) -> PayoutMethod;
        async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError>;
    }
}

/// A mobile-money gateway whose provider rejects every transfer.
pub fn rejecting_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_method().return_const(PayoutMethod::MobileMoneyA);
    gateway.expect_transfer().returning(|_, _| Err(TransferError::Provider("Insufficient balance".to_string())));
    gateway
}

#![allow(dead_code)]
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use escrow_common::Money;
use escrow_engine::{
    db_types::{BankAccount, NewOrder, Order, OrderId, PayoutChannel, PayoutMethod, PayoutProfile},
    events::{EventHandlers, EventHooks, EventProducers, Notification, ReleaseFailedEvent},
    gateways::{PayoutGateway, PayoutRails, PayoutRequest, TransferError, TransferReceipt},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    OrderFlowApi,
    PaymentReleaseApi,
    SqliteDatabase,
};
use rust_decimal::Decimal;

/// A fixed point in time with whole seconds, so that values survive the database round trip unchanged.
pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_717_243_200, 0).single().expect("valid timestamp")
}

/// A gateway that counts its calls and can be made slow, or made to fail.
#[derive(Clone)]
pub struct CountingGateway {
    method: PayoutMethod,
    calls: Arc<AtomicUsize>,
    delay: Duration,
    fail_with: Option<String>,
    new_recipient: Option<String>,
}

impl CountingGateway {
    pub fn new(method: PayoutMethod) -> Self {
        Self { method, calls: Arc::new(AtomicUsize::new(0)), delay: Duration::ZERO, fail_with: None, new_recipient: None }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.fail_with = Some(reason.to_string());
        self
    }

    pub fn creating_recipient(mut self, recipient_id: &str) -> Self {
        self.new_recipient = Some(recipient_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayoutGateway for CountingGateway {
    fn method(&self) -> PayoutMethod {
        self.method
    }

    async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError> {
        assert_eq!(channel.method(), self.method, "payout routed to the wrong rail");
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let needs_recipient = matches!(channel, PayoutChannel::Bank { recipient_id: None, .. });
        if let Some(reason) = &self.fail_with {
            let err = TransferError::Provider(reason.clone());
            return Err(match (&self.new_recipient, needs_recipient) {
                (Some(id), true) => err.with_new_recipient(id.clone()),
                _ => err,
            });
        }
        let receipt = TransferReceipt::new(format!("{}-{n}", request.idempotency_key), self.method);
        Ok(match (&self.new_recipient, needs_recipient) {
            (Some(id), true) => receipt.with_recipient_id(id.clone()),
            _ => receipt,
        })
    }
}

/// Everything the hooks saw.
#[derive(Clone, Default)]
pub struct Recorder {
    pub notifications: Arc<Mutex<Vec<Notification>>>,
    pub failures: Arc<Mutex<Vec<ReleaseFailedEvent>>>,
}

impl Recorder {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<ReleaseFailedEvent> {
        self.failures.lock().unwrap().clone()
    }

    /// Event handlers run in the background, so give them a moment to catch up.
    pub async fn wait_for_notifications(&self, count: usize) -> Vec<Notification> {
        for _ in 0..50 {
            if self.notifications.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.notifications()
    }

    pub async fn wait_for_failures(&self, count: usize) -> Vec<ReleaseFailedEvent> {
        for _ in 0..50 {
            if self.failures.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.failures()
    }

    pub async fn start(&self) -> EventProducers {
        let mut hooks = EventHooks::default();
        let notifications = Arc::clone(&self.notifications);
        hooks.on_notification(move |n| {
            let notifications = Arc::clone(&notifications);
            Box::pin(async move {
                notifications.lock().unwrap().push(n);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let failures = Arc::clone(&self.failures);
        hooks.on_release_failed(move |ev| {
            let failures = Arc::clone(&failures);
            Box::pin(async move {
                failures.lock().unwrap().push(ev);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handlers = EventHandlers::new(64, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;
        producers
    }
}

pub struct TestEnv {
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub recorder: Recorder,
    producers: EventProducers,
}

impl TestEnv {
    pub async fn new() -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        let recorder = Recorder::default();
        let producers = recorder.start().await;
        let orders = OrderFlowApi::new(db.clone());
        Self { db, orders, recorder, producers }
    }

    pub fn release_api(&self, rails: PayoutRails) -> PaymentReleaseApi<SqliteDatabase> {
        PaymentReleaseApi::new(self.db.clone(), rails, self.producers.clone())
    }

    pub async fn order(&self, id: &str, seller: &str, amount: i64, rate: Decimal) -> Order {
        let order = NewOrder::new(OrderId::from(id), "buyer-1", seller, Money::from(amount), rate).with_created_at(t0());
        self.orders.create_order(order).await.expect("Error creating order")
    }

    pub async fn delivered_order(&self, id: &str, seller: &str, amount: i64, delivered_at: DateTime<Utc>) -> Order {
        self.order(id, seller, amount, Decimal::new(5, 2)).await;
        self.orders.mark_delivered_at(&OrderId::from(id), delivered_at).await.expect("Error marking delivered")
    }

    pub async fn bank_seller(&self, seller: &str) -> PayoutProfile {
        let profile = PayoutProfile::new(seller).with_bank(BankAccount::new("Ada Obi", "0123456789", "058"));
        self.orders.set_payout_profile(profile).await.expect("Error saving payout profile")
    }

    pub async fn tear_down(self) {
        escrow_engine::test_utils::prepare_env::tear_down(self.db).await;
    }
}

pub fn rails_with(gateway: &CountingGateway) -> PayoutRails {
    PayoutRails::with_placeholder_rails(Duration::from_secs(5)).with_gateway(gateway.clone())
}

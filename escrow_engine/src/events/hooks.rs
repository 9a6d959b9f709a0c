use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    Notification,
    NotificationSink,
    PaymentReleasedEvent,
    ReleaseFailedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_released_producer: Vec<EventProducer<PaymentReleasedEvent>>,
    pub release_failed_producer: Vec<EventProducer<ReleaseFailedEvent>>,
    pub notification_producer: Vec<EventProducer<Notification>>,
}

impl EventProducers {
    /// Fans the event out to every subscriber without waiting on any of them.
    pub fn payment_released(&self, event: PaymentReleasedEvent) {
        for producer in &self.payment_released_producer {
            producer.try_publish_event(event.clone());
        }
    }

    pub fn release_failed(&self, event: ReleaseFailedEvent) {
        for producer in &self.release_failed_producer {
            producer.try_publish_event(event.clone());
        }
    }

    pub fn notify(&self, notification: Notification) {
        if self.notification_producer.is_empty() {
            trace!("📬️ No notification hook is registered. Dropping notification for {}", notification.user_id);
        }
        for producer in &self.notification_producer {
            producer.try_publish_event(notification.clone());
        }
    }
}

pub struct EventHandlers {
    pub on_payment_released: Option<EventHandler<PaymentReleasedEvent>>,
    pub on_release_failed: Option<EventHandler<ReleaseFailedEvent>>,
    pub on_notification: Option<EventHandler<Notification>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_released = hooks.on_payment_released.map(|f| EventHandler::new(buffer_size, f));
        let on_release_failed = hooks.on_release_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_notification = hooks.on_notification.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_released, on_release_failed, on_notification }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_released {
            result.payment_released_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_release_failed {
            result.release_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_released {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_release_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_notification {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_released: Option<Handler<PaymentReleasedEvent>>,
    pub on_release_failed: Option<Handler<ReleaseFailedEvent>>,
    pub on_notification: Option<Handler<Notification>>,
}

impl EventHooks {
    pub fn on_payment_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentReleasedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_released = Some(Arc::new(f));
        self
    }

    pub fn on_release_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReleaseFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_release_failed = Some(Arc::new(f));
        self
    }

    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(Notification) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }

    /// Routes every notification to `sink`. Delivery failures are logged and otherwise ignored.
    pub fn deliver_notifications_to<S: NotificationSink + 'static>(&mut self, sink: Arc<S>) -> &mut Self {
        self.on_notification(move |n: Notification| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                let user = n.user_id.clone();
                if let Err(e) = sink.notify(&n.user_id, n.kind, &n.title, &n.message, n.data).await {
                    warn!("📬️ Could not deliver notification to {user}: {e}");
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::events::{NotificationError, NotificationKind};

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<(String, NotificationKind)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(
            &self,
            user_id: &str,
            kind: NotificationKind,
            _title: &str,
            _message: &str,
            _data: Value,
        ) -> Result<(), NotificationError> {
            if user_id == "broken" {
                return Err(NotificationError::DeliveryFailed("no device registered".into()));
            }
            self.received.lock().unwrap().push((user_id.to_string(), kind));
            Ok(())
        }
    }

    fn notification(user: &str) -> Notification {
        Notification {
            user_id: user.to_string(),
            kind: NotificationKind::PaymentReceived,
            title: "t".into(),
            message: "m".into(),
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn notifications_reach_the_sink() {
        let _ = env_logger::try_init();
        let sink = Arc::new(RecordingSink::default());
        let mut hooks = EventHooks::default();
        hooks.deliver_notifications_to(Arc::clone(&sink));
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        assert_eq!(producers.notification_producer.len(), 1);
        assert!(producers.payment_released_producer.is_empty());

        producers.notify(notification("alice"));
        producers.notify(notification("broken"));
        producers.notify(notification("bob"));
        drop(producers);
        let handler = handlers.on_notification.expect("notification handler");
        handler.start_handler().await;

        let mut received = sink.received.lock().unwrap().clone();
        received.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(received, vec![
            ("alice".to_string(), NotificationKind::PaymentReceived),
            ("bob".to_string(), NotificationKind::PaymentReceived),
        ]);
    }

    #[test]
    fn publishing_without_hooks_is_a_no_op() {
        let producers = EventProducers::default();
        producers.notify(notification("alice"));
        producers.release_failed(ReleaseFailedEvent {
            order_id: "o1".into(),
            seller_id: "s1".into(),
            trigger: crate::db_types::ReleaseTrigger::Automatic,
            reason: "no payout channel".into(),
        });
    }
}

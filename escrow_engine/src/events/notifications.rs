use async_trait::async_trait;
use log::*;
use serde_json::Value;
use thiserror::Error;

use crate::events::NotificationKind;

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Notification could not be delivered: {0}")]
    DeliveryFailed(String),
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),
}

/// Somewhere to deliver user-facing notifications (push, e-mail, an in-app inbox, ...).
///
/// Notifications are best-effort. A failed delivery never undoes a payment release.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Used when no real delivery channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<(), NotificationError> {
        info!("📬️ [{kind:?}] to {user_id}: {title}. {message} {data}");
        Ok(())
    }
}

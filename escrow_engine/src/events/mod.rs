mod channel;
mod event_types;
mod hooks;
mod notifications;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
pub use notifications::{LogNotificationSink, NotificationError, NotificationSink};

//! Fire-and-forget event delivery
//!
//! The release engine publishes events (a payment was released, a release failed, a user must be notified) and hooks
//! react to them. Hooks only ever see the event itself, never the engine's state. Every event is handled on its own
//! task, so a slow notification provider never holds up a payout, and publishing never blocks: if the buffer is full
//! the event is dropped and the loss is logged.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError},
    task::JoinSet,
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Owns the receiving end of an event channel and runs the hook for every event that arrives.
pub struct EventHandler<E: Send + Sync + 'static> {
    events: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, events) = mpsc::channel(buffer_size.max(1));
        Self { events, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { sender: self.sender.clone() }
    }

    /// Runs until every producer has been dropped and all in-flight hooks have finished.
    pub async fn start_handler(self) {
        let Self { mut events, sender, handler } = self;
        // Only producers may keep the channel open
        drop(sender);
        debug!("📬️ Event handler is listening");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let hook = Arc::clone(&handler);
                        in_flight.spawn(async move { (hook)(event).await });
                    },
                    None => break,
                },
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => log_hook_outcome(done),
            }
        }
        while let Some(done) = in_flight.join_next().await {
            log_hook_outcome(done);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_hook_outcome(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!("📬️ An event hook did not run to completion. {e}");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    /// Returns false if the event could not be queued. The engine never waits on its hooks.
    pub fn try_publish_event(&self, event: E) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("📬️ Event buffer is full. The event has been dropped.");
                false
            },
            Err(TrySendError::Closed(_)) => {
                error!("📬️ Event handler has shut down. The event has been dropped.");
                false
            },
        }
    }
}

//! Payout rails.
//!
//! A [`PayoutGateway`] performs exactly one outbound transfer attempt to a single [`PayoutChannel`] and either returns
//! a reference or fails. The release engine picks the gateway for the seller's channel from a [`PayoutRails`]
//! registry and never talks to a provider directly.
//!
//! Gateways must be safe to call twice for the same logical payout. Each request carries an idempotency key derived
//! from the order id that providers supporting deduplication can use.
//!
//! Every gateway imposes its own timeout (see [`with_timeout`]), so a slow provider never blocks a release forever.
use std::{collections::HashMap, fmt::Debug, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_common::Money;
use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{OrderId, PayoutChannel, PayoutMethod};

mod bank_transfer;
mod manual;
mod mobile_money;

pub use bank_transfer::{BankTransferConfig, BankTransferGateway};
pub use manual::ManualGateway;
pub use mobile_money::{MobileMoneyGateway, MobileMoneyProvider};

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum TransferError {
    #[error("The payout provider did not respond within {0:?}")]
    Timeout(Duration),
    #[error("The payout provider rejected the request. {0}")]
    Provider(String),
    #[error("Could not reach the payout provider. {0}")]
    Network(String),
    #[error("The payout provider returned an unexpected response. {0}")]
    MalformedResponse(String),
    #[error("The {method} gateway cannot pay out to this channel. {reason}")]
    InvalidChannel { method: PayoutMethod, reason: String },
    #[error("No gateway is configured for {0}")]
    RailNotConfigured(PayoutMethod),
    #[error("Invalid payout amount. {0}")]
    InvalidAmount(String),
    /// The transfer failed after the gateway had already registered a new recipient with the provider.
    #[error("{source}")]
    AfterNewRecipient { recipient_id: String, source: Box<TransferError> },
}

impl TransferError {
    pub fn with_new_recipient(self, recipient_id: String) -> Self {
        Self::AfterNewRecipient { recipient_id, source: Box::new(self) }
    }

    /// The provider-side recipient created during a failed transfer, if any. It should still be cached, or every retry
    /// registers the same account again.
    pub fn new_recipient_id(&self) -> Option<&str> {
        match self {
            Self::AfterNewRecipient { recipient_id, .. } => Some(recipient_id),
            _ => None,
        }
    }
}

/// What to pay, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: String,
    /// Stable per order, so a retried payout can be recognised as the same payout by the provider.
    pub idempotency_key: String,
}

impl PayoutRequest {
    pub fn for_order(order_id: &OrderId, amount: Money) -> Self {
        Self {
            order_id: order_id.clone(),
            amount,
            reason: format!("Payout for order {order_id}"),
            idempotency_key: format!("payout-{}", order_id.as_str()),
        }
    }
}

/// A successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub method: PayoutMethod,
    pub succeeded_at: DateTime<Utc>,
    /// Set when the gateway had to create a new provider-side recipient for this payout. Callers should cache it on
    /// the seller's payout profile.
    pub recipient_id: Option<String>,
}

impl TransferReceipt {
    pub fn new<S: Into<String>>(reference: S, method: PayoutMethod) -> Self {
        Self { reference: reference.into(), method, succeeded_at: Utc::now(), recipient_id: None }
    }

    pub fn with_recipient_id(mut self, recipient_id: String) -> Self {
        self.recipient_id = Some(recipient_id);
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    /// The rail this gateway serves.
    fn method(&self) -> PayoutMethod;

    async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError>;
}

/// Runs a gateway call, converting an elapsed timeout into [`TransferError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, TransferError>
where F: Future<Output = Result<T, TransferError>> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("🏦 Payout provider call timed out after {limit:?}");
            Err(TransferError::Timeout(limit))
        },
    }
}

/// A short random suffix for references fabricated by the placeholder rails.
pub(crate) fn reference_suffix() -> String {
    format!("{:08X}", rand::random::<u32>())
}

/// The set of payout rails available to the release engine, keyed by [`PayoutMethod`].
#[derive(Clone, Default)]
pub struct PayoutRails {
    gateways: HashMap<PayoutMethod, Arc<dyn PayoutGateway>>,
}

impl Debug for PayoutRails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods = self.methods();
        methods.sort_by_key(|m| m.as_str());
        f.debug_struct("PayoutRails").field("methods", &methods).finish()
    }
}

impl PayoutRails {
    pub fn new() -> Self {
        Self::default()
    }

    /// The placeholder rails: mobile money A and B and manual payouts. The bank rail needs credentials and must be
    /// added separately.
    pub fn with_placeholder_rails(timeout: Duration) -> Self {
        Self::new()
            .with_gateway(MobileMoneyGateway::new(MobileMoneyProvider::A, timeout))
            .with_gateway(MobileMoneyGateway::new(MobileMoneyProvider::B, timeout))
            .with_gateway(ManualGateway::new())
    }

    /// Registers `gateway` for the rail it reports via [`PayoutGateway::method`], replacing any previous one.
    pub fn with_gateway<G: PayoutGateway + 'static>(self, gateway: G) -> Self {
        self.with_shared_gateway(Arc::new(gateway))
    }

    pub fn with_shared_gateway(mut self, gateway: Arc<dyn PayoutGateway>) -> Self {
        let method = gateway.method();
        if self.gateways.insert(method, gateway).is_some() {
            debug!("🏦 Replaced the {method} gateway");
        }
        self
    }

    pub fn gateway_for(&self, method: PayoutMethod) -> Result<Arc<dyn PayoutGateway>, TransferError> {
        self.gateways.get(&method).cloned().ok_or(TransferError::RailNotConfigured(method))
    }

    pub fn methods(&self) -> Vec<PayoutMethod> {
        self.gateways.keys().copied().collect()
    }

    /// Sends the payout through the gateway registered for the channel's rail.
    pub async fn transfer(
        &self,
        channel: &PayoutChannel,
        request: &PayoutRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let gateway = self.gateway_for(channel.method())?;
        debug!("🏦 Sending {} for order {} via {}", request.amount, request.order_id, channel.method().description());
        gateway.transfer(channel, request).await
    }
}

//! # Database backend contracts
//!
//! This module defines the behaviour a storage backend must expose in order to be used by the escrow engine.
//! You should not need to call these traits directly; use the public APIs in [`crate::OrderFlowApi`] and
//! [`crate::PaymentReleaseApi`] instead.
//!
//! * [`EscrowDatabase`] is the base trait. It fixes the backend error type and connection lifecycle.
//! * [`OrderManagement`] stores orders and applies fulfillment transitions.
//! * [`PayoutProfileManagement`] stores seller payout details.
//! * [`CommissionLedger`] records platform commission, exactly once per order.
//! * [`ReleaseManagement`] holds the conditional updates that guard the release of an order's payment. These are the
//!   authoritative protection against double payouts, since several processes may run the release flow at once.
mod commission_ledger;
mod data_objects;
mod order_management;
mod payout_profile_management;
mod release_management;

pub use commission_ledger::CommissionLedger;
pub use data_objects::{FulfillmentUpdate, InsertOrderResult};
pub use order_management::OrderManagement;
pub use payout_profile_management::PayoutProfileManagement;
pub use release_management::ReleaseManagement;

#[allow(async_fn_in_trait)]
pub trait EscrowDatabase: Clone {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Everything the release flow needs from a storage backend.
pub trait EscrowBackend: OrderManagement + PayoutProfileManagement + CommissionLedger + ReleaseManagement {}

impl<T> EscrowBackend for T where T: OrderManagement + PayoutProfileManagement + CommissionLedger + ReleaseManagement {}

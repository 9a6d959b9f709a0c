//! Escrow Payment Engine
//!
//! The escrow engine holds the money a buyer paid at checkout against their order, and releases it to the seller
//! exactly once. A release is either requested by an admin, or happens automatically once the order has been delivered
//! and the hold period has passed. This library contains the core logic; it knows nothing about HTTP.
//!
//! The library is divided into these sections:
//! 1. Database management ([`mod@db`]). SQLite is the supported backend. You should never need to access the
//!    database directly. The exception is the data types, which are defined in [`mod@db_types`] and are public.
//! 2. The order payment state machine ([`mod@state_machine`]), the only component that changes an order's status.
//! 3. Payout rails ([`mod@gateways`]): bank transfer, two mobile-money providers and a manual fallback, all behind the
//!    [`gateways::PayoutGateway`] trait.
//! 4. The public API: [`OrderFlowApi`] for checkout, fulfillment and payout details, and [`PaymentReleaseApi`] for
//!    releases and the auto-release sweep.
//!
//! The engine also emits events ([`mod@events`]) when a payment is released, when a release fails, and when a user
//! needs to be told about it. Hooks can be attached to these to deliver notifications or alert an operator.
mod db;

pub mod db_types;
pub mod events;
pub mod gateways;
pub mod state_machine;

mod escrow_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{
    CommissionLedger,
    EscrowBackend,
    EscrowDatabase,
    FulfillmentUpdate,
    InsertOrderResult,
    OrderManagement,
    PayoutProfileManagement,
    ReleaseManagement,
};
pub use escrow_api::{
    errors::{OrderFlowError, ReleaseError},
    order_flow_api::{OrderDetails, OrderFlowApi},
    release_api::{
        PaymentReleaseApi,
        ReleaseResult,
        SweepFailure,
        SweepResult,
        DEFAULT_MAX_CONCURRENT_RELEASES,
        DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS,
    },
};
pub use state_machine::OrderPaymentStateMachine;

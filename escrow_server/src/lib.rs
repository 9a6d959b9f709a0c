//! # Escrow server
//! This crate hosts the HTTP server for the escrow payment engine. It is responsible for:
//! * Authenticating admins and sellers with bearer access tokens, and checking their roles.
//! * Exposing manual payment release and the payout-related seller actions over HTTP.
//! * Running the auto-release scheduler, which periodically pays out orders whose hold period has passed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/orders/{order_id}/release`: Manually release the payment for an order (admin).
//! * `/api/auto_release/run`: Run the auto-release sweep now (admin).
//! * `/api/orders/{order_id}`: Order details, including the commission record (admin).
//! * `/api/commission`: Total commission collected (admin).
//! * `/api/orders/{order_id}/delivered`: Confirm delivery of an order (seller).
//! * `/api/payout_profile`: Fetch or replace the caller's payout details (seller).

pub mod auth;
pub mod auto_release_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod server;

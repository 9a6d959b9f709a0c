pub mod errors;
pub mod order_flow_api;
pub mod release_api;

//! oe-daemon library target.
//!
//! Exposes the router and state for integration tests. The binary `main.rs` depends on
//! this library target.

pub mod routes;
pub mod state;
pub mod tick_bridge;

//! Multi-strategy registry and tick dispatcher: every registered strategy watches one
//! symbol, sees a bounded recent-tick window, and reacts through a pure `Strategy`
//! trait. `runner` wraps the registry with persistence, risk-checked order placement,
//! and the intent/ack control loop.

mod host;
mod types;

pub mod runner;

pub use host::StrategyRegistry;
pub use runner::StrategyRunner;
pub use types::*;

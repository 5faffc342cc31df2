//! Order-time risk engine: the nine-step check that every order passes through before
//! it reaches the broker.
//!
//! The decision logic (`engine::evaluate`) is deterministic, synchronous, pure — no IO,
//! no lock, no broker call. `orchestrate` is the async shell around it: it takes the
//! cross-process lock, fetches live margin through the circuit breaker, and persists the
//! verdict.

mod engine;
mod types;

pub mod orchestrate;

pub use engine::evaluate;
pub use orchestrate::{validate_and_place, Decision};
pub use types::*;

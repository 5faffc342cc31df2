//! Periodic position/order reconciliation against the broker's live view.
//!
//! Divergence doesn't halt trading: a quantity mismatch is corrected to the broker's
//! number and logged, a broker-confirmed fill the local row hasn't caught up to is
//! applied, and an order the broker has no record of is surfaced for inspection.
//! Only repeated *failure to reconcile at all* — the broker unreachable three cycles
//! running — escalates to the kill switch, via `ReconcileFail`.

mod engine;
mod types;

pub mod orchestrate;

pub use engine::run_cycle;
pub use orchestrate::{run_forever, run_once, MAX_RECONCILE_FAILURES, RECONCILE_INTERVAL_SECONDS};
pub use types::*;

//! Websocket feed health: a pure staleness classifier, an async monitor that polls the
//! durable heartbeat table and trips the websocket circuit breaker when the feed's been
//! dead too long, a fast-cache trait for sub-millisecond tick lookups, and the worker
//! that actually owns the live subscription, fast-cache writes, and handler fan-out.

mod types;

pub mod cache;
pub mod monitor;
pub mod worker;

pub use cache::{FastCache, NoopCache};
pub use monitor::{run_with_reconnect, FeedMonitor};
pub use types::*;
pub use worker::{FeedStatus, FeedWorker, TickHandler};

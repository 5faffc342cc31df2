//! Shared runtime state for oe-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;

use oe_broker::BrokerAdapter;
use oe_feed::{FeedWorker, NoopCache};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers and background workers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<dyn BrokerAdapter>,
    pub session_id: Uuid,
    pub feed: Arc<FeedWorker<NoopCache>>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, broker: Arc<dyn BrokerAdapter>, session_id: Uuid, feed: Arc<FeedWorker<NoopCache>>) -> Self {
        Self {
            pool,
            broker,
            session_id,
            feed,
            build: BuildInfo {
                service: "oe-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_secs()
}

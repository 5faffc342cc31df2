//! Async shell around the pure heartbeat classifier: polls `feed_heartbeat` for a named
//! feed, tracks consecutive dead readings in memory, and trips the websocket circuit
//! breaker once that streak reaches `CB_TRIP_THRESHOLD` — a single slow tick shouldn't
//! page anyone, a feed that's been silent for a while should stop strategies from
//! trading on stale prices.
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use oe_circuit::Service;
use oe_db::feed;
use sqlx::PgPool;

use crate::types::{classify, FeedState, CB_TRIP_THRESHOLD};

pub struct FeedMonitor {
    pool: PgPool,
    feed_name: String,
    consecutive_dead: AtomicU32,
}

impl FeedMonitor {
    pub fn new(pool: PgPool, feed_name: impl Into<String>) -> Self {
        Self {
            pool,
            feed_name: feed_name.into(),
            consecutive_dead: AtomicU32::new(0),
        }
    }

    /// Polls the feed's heartbeat row once, classifies its freshness, and updates the
    /// websocket circuit breaker accordingly. Returns the classification so the caller
    /// (or a test) can observe what happened.
    pub async fn poll_once(&self) -> Result<FeedState> {
        let heartbeat = feed::fetch(&self.pool, &self.feed_name)
            .await?
            .context("feed has no heartbeat row yet")?;

        let age_seconds = (Utc::now() - heartbeat.last_tick_at).num_milliseconds() as f64 / 1000.0;
        let state = classify(age_seconds.max(0.0));

        match state {
            FeedState::Dead => {
                let streak = self.consecutive_dead.fetch_add(1, Ordering::SeqCst) + 1;
                feed::mark_disconnected(&self.pool, &self.feed_name).await?;
                if streak >= CB_TRIP_THRESHOLD {
                    oe_circuit::record_failure(&self.pool, Service::Websocket).await?;
                    self.consecutive_dead.store(0, Ordering::SeqCst);
                    tracing::warn!(feed = %self.feed_name, streak, "websocket breaker tripped on dead feed");
                }
            }
            FeedState::Fresh | FeedState::Stale => {
                if self.consecutive_dead.swap(0, Ordering::SeqCst) > 0 {
                    oe_circuit::record_success(&self.pool, Service::Websocket).await?;
                }
            }
        }

        Ok(state)
    }

    /// Polls at a fixed cadence until the process is killed. Errors from a single poll
    /// (e.g. the heartbeat row hasn't been written yet on a fresh session) are logged
    /// and the loop continues rather than aborting.
    pub async fn run_forever(&self, poll_interval: Duration) -> ! {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                tracing::warn!(feed = %self.feed_name, error = %e, "feed heartbeat poll failed");
            }
        }
    }
}

/// Drives `connect` with the reconnect backoff schedule until it succeeds, recording
/// each attempt's outcome to the feed heartbeat table. `connect` should return once the
/// connection drops so this can retry.
pub async fn run_with_reconnect<F, Fut>(pool: &PgPool, feed_name: &str, mut connect: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut attempt: u32 = 0;
    loop {
        match connect().await {
            Ok(()) => {
                feed::mark_connected(pool, feed_name).await?;
                attempt = 0;
            }
            Err(e) => {
                attempt += 1;
                feed::mark_disconnected(pool, feed_name).await?;
                let delay = crate::types::reconnect_delay_seconds(attempt);
                tracing::warn!(feed = feed_name, attempt, delay_s = delay, error = %e, "feed connection dropped, retrying");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }
    }
}

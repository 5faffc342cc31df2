//! Fast-path key/value tier for sub-millisecond tick lookups. Optional by design: every
//! write is best-effort, and any read miss falls back to the durable store, so a deployment
//! with no cache configured just runs `NoopCache` and pays the durable-store latency.
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait FastCache: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration);
    async fn get(&self, key: &str) -> Option<String>;
    async fn delete(&self, key: &str);
}

/// Stands in when no cache is configured. Every write is dropped, every read misses —
/// callers always fall through to the durable store, which is the documented contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl FastCache for NoopCache {
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) {}
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }
    async fn delete(&self, _key: &str) {}
}

pub fn last_tick_ts_key() -> String {
    "last_tick_ts".to_string()
}

pub fn ws_connected_key() -> String {
    "ws_connected".to_string()
}

pub fn ltp_key(symbol: &str) -> String {
    format!("ltp:{symbol}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_cache_never_returns_a_value() {
        let cache = NoopCache;
        cache.set_ex("ltp:NIFTY", "100.0", Duration::from_secs(10)).await;
        assert_eq!(cache.get("ltp:NIFTY").await, None);
    }
}

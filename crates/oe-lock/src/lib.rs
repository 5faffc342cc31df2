//! PostgreSQL advisory locks standing in for a process-local mutex.
//!
//! A plain `tokio::sync::Mutex` only serializes risk evaluation within one process. Run
//! two instances of the daemon (or two replicas) against the same database and both can
//! pass a risk check for the same session simultaneously. Advisory locks are scoped to
//! the database itself, so they serialize across every process talking to it, and they
//! release automatically when the holding transaction ends — no unlock call, no leak on
//! crash.
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// Arbitrary namespace so these keys don't collide with some other advisory lock user of
/// the same database. Spells "OE" in hex, padded.
const LOCK_NAMESPACE: &str = "4F45454E47494E45";

fn derive_lock_key(parts: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(LOCK_NAMESPACE.as_bytes());
    hasher.update(b":");
    hasher.update(parts.as_bytes());
    let digest = hasher.finalize();
    i64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"))
}

pub fn risk_lock_key(session_id: uuid::Uuid) -> i64 {
    derive_lock_key(&session_id.to_string())
}

pub fn position_lock_key(session_id: uuid::Uuid, symbol: &str) -> i64 {
    derive_lock_key(&format!("{session_id}:{symbol}"))
}

/// Attempts `pg_try_advisory_xact_lock` for `key` inside `tx`, after setting a local lock
/// timeout. Returns `true` iff acquired. The lock is transaction-scoped: it releases on
/// commit or rollback, never needs an explicit unlock, and the caller must keep using the
/// same transaction for every statement that the lock is meant to protect.
pub async fn try_acquire_xact_lock(
    tx: &mut Transaction<'_, Postgres>,
    key: i64,
    timeout_ms: u64,
) -> Result<bool> {
    set_local_lock_timeout(&mut *tx, timeout_ms).await?;

    let acquired: (bool,) = sqlx::query_as("select pg_try_advisory_xact_lock($1)")
        .bind(key)
        .fetch_one(&mut **tx)
        .await
        .context("pg_try_advisory_xact_lock failed")?;
    Ok(acquired.0)
}

async fn set_local_lock_timeout(conn: &mut PgConnection, timeout_ms: u64) -> Result<()> {
    sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
        .execute(conn)
        .await
        .context("SET LOCAL lock_timeout failed")?;
    Ok(())
}

/// Begins a transaction on `pool` and attempts the risk lock for `session_id`. Returns
/// `None` if the lock timed out — callers should reject the order with `LOCK_TIMEOUT`
/// rather than retry indefinitely. On `Some`, the caller owns the transaction and must
/// commit it to release the lock.
pub async fn begin_risk_lock(
    pool: &PgPool,
    session_id: uuid::Uuid,
    timeout_ms: u64,
) -> Result<Option<Transaction<'static, Postgres>>> {
    let mut tx = pool.begin().await.context("begin risk lock transaction")?;
    let key = risk_lock_key(session_id);
    let acquired = try_acquire_xact_lock(&mut tx, key, timeout_ms).await?;
    if !acquired {
        tx.rollback().await.ok();
        return Ok(None);
    }
    Ok(Some(tx))
}

/// Begins a transaction on `pool` and attempts the position lock for `(session_id,
/// symbol)`. Same contract as [`begin_risk_lock`]: `None` on timeout, `Some` transaction
/// must be committed by the caller to release the lock.
pub async fn begin_position_lock(
    pool: &PgPool,
    session_id: uuid::Uuid,
    symbol: &str,
    timeout_ms: u64,
) -> Result<Option<Transaction<'static, Postgres>>> {
    let mut tx = pool.begin().await.context("begin position lock transaction")?;
    let key = position_lock_key(session_id, symbol);
    let acquired = try_acquire_xact_lock(&mut tx, key, timeout_ms).await?;
    if !acquired {
        tx.rollback().await.ok();
        return Ok(None);
    }
    Ok(Some(tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_session_same_key() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(risk_lock_key(id), risk_lock_key(id));
    }

    #[test]
    fn different_sessions_different_keys() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        assert_ne!(risk_lock_key(a), risk_lock_key(b));
    }

    #[test]
    fn position_lock_is_distinct_from_risk_lock() {
        let id = uuid::Uuid::new_v4();
        assert_ne!(risk_lock_key(id), position_lock_key(id, "NIFTY24AUGFUT"));
    }

    #[test]
    fn position_lock_varies_by_symbol() {
        let id = uuid::Uuid::new_v4();
        assert_ne!(
            position_lock_key(id, "NIFTY24AUGFUT"),
            position_lock_key(id, "BANKNIFTY24AUGFUT")
        );
    }
}

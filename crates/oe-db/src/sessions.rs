use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TradingSession {
    pub id: Uuid,
    pub date: String,

    pub is_killed: bool,
    pub kill_reason: Option<String>,
    pub kill_time: Option<DateTime<Utc>>,
    pub killed_by: Option<String>,

    pub max_daily_loss: f64,
    pub max_position_size: i32,
    pub max_open_orders: i32,
    pub max_margin_usage_pct: f64,
    pub max_lot_size: i32,

    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_orders: i32,
    pub rejected_orders: i32,

    pub reconcile_failure_count: i32,
    pub last_reconcile_at: Option<DateTime<Utc>>,
    pub last_reconcile_status: String,
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<TradingSession> {
    Ok(TradingSession {
        id: row.try_get("id")?,
        date: row.try_get("date")?,
        is_killed: row.try_get("is_killed")?,
        kill_reason: row.try_get("kill_reason")?,
        kill_time: row.try_get("kill_time")?,
        killed_by: row.try_get("killed_by")?,
        max_daily_loss: row.try_get("max_daily_loss")?,
        max_position_size: row.try_get("max_position_size")?,
        max_open_orders: row.try_get("max_open_orders")?,
        max_margin_usage_pct: row.try_get("max_margin_usage_pct")?,
        max_lot_size: row.try_get("max_lot_size")?,
        realized_pnl: row.try_get("realized_pnl")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        total_orders: row.try_get("total_orders")?,
        rejected_orders: row.try_get("rejected_orders")?,
        reconcile_failure_count: row.try_get("reconcile_failure_count")?,
        last_reconcile_at: row.try_get("last_reconcile_at")?,
        last_reconcile_status: row.try_get("last_reconcile_status")?,
    })
}

const SESSION_COLUMNS: &str = r#"
    id, date, is_killed, kill_reason, kill_time, killed_by,
    max_daily_loss, max_position_size, max_open_orders, max_margin_usage_pct, max_lot_size,
    realized_pnl, unrealized_pnl, total_orders, rejected_orders,
    reconcile_failure_count, last_reconcile_at, last_reconcile_status
"#;

/// Ensures a session row exists for `date`, inserting one with default limits if absent.
/// Idempotent: a race between two callers resolves via `ON CONFLICT DO NOTHING`.
pub async fn ensure_session(pool: &PgPool, date: &str) -> Result<TradingSession> {
    sqlx::query("insert into trading_sessions (date) values ($1) on conflict (date) do nothing")
        .bind(date)
        .execute(pool)
        .await
        .context("ensure_session insert failed")?;

    fetch_session_by_date(pool, date)
        .await?
        .context("session row missing immediately after ensure_session insert")
}

pub async fn fetch_session_by_date(pool: &PgPool, date: &str) -> Result<Option<TradingSession>> {
    let row = sqlx::query(&format!(
        "select {SESSION_COLUMNS} from trading_sessions where date = $1"
    ))
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("fetch_session_by_date failed")?;

    row.as_ref().map(row_to_session).transpose()
}

pub async fn fetch_session(pool: &PgPool, session_id: Uuid) -> Result<TradingSession> {
    let row = sqlx::query(&format!(
        "select {SESSION_COLUMNS} from trading_sessions where id = $1"
    ))
    .bind(session_id)
    .fetch_one(pool)
    .await
    .context("fetch_session failed")?;

    row_to_session(&row)
}

/// Fresh, lock-protected read used on the risk path: `SELECT ... FOR UPDATE` inside the
/// caller's transaction, belt-and-suspenders alongside the advisory lock.
pub async fn lock_session_row_for_update(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
) -> Result<TradingSession> {
    let row = sqlx::query(&format!(
        "select {SESSION_COLUMNS} from trading_sessions where id = $1 for update"
    ))
    .bind(session_id)
    .fetch_one(&mut **tx)
    .await
    .context("lock_session_row_for_update failed")?;

    row_to_session(&row)
}

/// Conditional kill-switch activation: idempotent, only the first trigger's reason sticks.
/// Returns `true` if this call is the one that actually flipped the switch.
pub async fn trigger_kill_switch(
    pool: &PgPool,
    session_id: Uuid,
    reason: &str,
    actor: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update trading_sessions
        set is_killed = true, kill_reason = $2, kill_time = now(), killed_by = $3
        where id = $1 and is_killed = false
        "#,
    )
    .bind(session_id)
    .bind(reason)
    .bind(actor)
    .execute(pool)
    .await
    .context("trigger_kill_switch update failed")?;

    Ok(result.rows_affected() == 1)
}

/// Manual, unconditional deactivation. The caller is responsible for the accompanying
/// audit event.
pub async fn deactivate_kill_switch(pool: &PgPool, session_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update trading_sessions
        set is_killed = false, kill_reason = null, kill_time = null, killed_by = null
        where id = $1
        "#,
    )
    .bind(session_id)
    .execute(pool)
    .await
    .context("deactivate_kill_switch failed")?;
    Ok(())
}

/// Atomically bumps realized P&L. Returns the session row after the update so the
/// caller can decide whether the new day-P&L breaches the daily loss limit.
pub async fn record_realized_pnl(
    pool: &PgPool,
    session_id: Uuid,
    delta: f64,
) -> Result<TradingSession> {
    sqlx::query("update trading_sessions set realized_pnl = realized_pnl + $2 where id = $1")
        .bind(session_id)
        .bind(delta)
        .execute(pool)
        .await
        .context("record_realized_pnl failed")?;

    fetch_session(pool, session_id).await
}

pub async fn set_unrealized_pnl(pool: &PgPool, session_id: Uuid, value: f64) -> Result<()> {
    sqlx::query("update trading_sessions set unrealized_pnl = $2 where id = $1")
        .bind(session_id)
        .bind(value)
        .execute(pool)
        .await
        .context("set_unrealized_pnl failed")?;
    Ok(())
}

pub async fn increment_order_counters(
    pool: &PgPool,
    session_id: Uuid,
    rejected: bool,
) -> Result<()> {
    if rejected {
        sqlx::query(
            "update trading_sessions set total_orders = total_orders + 1, rejected_orders = rejected_orders + 1 where id = $1",
        )
    } else {
        sqlx::query("update trading_sessions set total_orders = total_orders + 1 where id = $1")
    }
    .bind(session_id)
    .execute(pool)
    .await
    .context("increment_order_counters failed")?;
    Ok(())
}

/// Reconciliation failure path: bump the persistent counter, return the new value.
pub async fn increment_reconcile_failure_count(pool: &PgPool, session_id: Uuid) -> Result<i32> {
    let row = sqlx::query(
        "update trading_sessions set reconcile_failure_count = reconcile_failure_count + 1 where id = $1 returning reconcile_failure_count",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await
    .context("increment_reconcile_failure_count failed")?;
    Ok(row.try_get("reconcile_failure_count")?)
}

pub async fn record_reconcile_outcome(
    pool: &PgPool,
    session_id: Uuid,
    status: &str,
    reset_failure_count: bool,
) -> Result<()> {
    if reset_failure_count {
        sqlx::query(
            r#"
            update trading_sessions
            set last_reconcile_at = now(), last_reconcile_status = $2, reconcile_failure_count = 0
            where id = $1
            "#,
        )
    } else {
        sqlx::query(
            r#"
            update trading_sessions
            set last_reconcile_at = now(), last_reconcile_status = $2
            where id = $1
            "#,
        )
    }
    .bind(session_id)
    .bind(status)
    .execute(pool)
    .await
    .context("record_reconcile_outcome failed")?;
    Ok(())
}

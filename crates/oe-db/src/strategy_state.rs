use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct StrategyState {
    pub id: i32,
    pub strategy_name: String,
    pub session_id: Option<uuid::Uuid>,

    pub status: String,
    pub control_intent: Option<String>,
    pub intent_set_at: Option<DateTime<Utc>>,
    pub intent_acked_at: Option<DateTime<Utc>>,
    pub intent_actor: Option<String>,

    pub pnl: f64,
    pub allocated_capital: f64,
    pub open_qty: i32,
    pub avg_entry: Option<f64>,
    pub ltp: Option<f64>,
    pub win_rate: f64,
    pub total_trades: i32,
    pub winning_trades: i32,

    pub net_delta: f64,
    pub drawdown_pct: f64,
    pub max_dd_pct: f64,
    pub risk_pct: f64,
    pub direction_bias: String,

    pub current_signal: Option<String>,
    pub symbol: Option<String>,
    pub strategy_type: Option<String>,

    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub error_count: i32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_good_at: Option<DateTime<Utc>>,
    pub restart_count: i32,
    pub auto_restart: bool,

    pub last_trade_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

const STRATEGY_STATE_COLUMNS: &str = r#"
    id, strategy_name, session_id, status, control_intent, intent_set_at, intent_acked_at,
    intent_actor, pnl, allocated_capital, open_qty, avg_entry, ltp, win_rate, total_trades,
    winning_trades, net_delta, drawdown_pct, max_dd_pct, risk_pct, direction_bias,
    current_signal, symbol, strategy_type, error_message, error_trace, error_count,
    last_error_at, last_good_at, restart_count, auto_restart, last_trade_at, last_tick_at,
    started_at
"#;

fn row_to_state(row: &sqlx::postgres::PgRow) -> Result<StrategyState> {
    Ok(StrategyState {
        id: row.try_get("id")?,
        strategy_name: row.try_get("strategy_name")?,
        session_id: row.try_get("session_id")?,
        status: row.try_get("status")?,
        control_intent: row.try_get("control_intent")?,
        intent_set_at: row.try_get("intent_set_at")?,
        intent_acked_at: row.try_get("intent_acked_at")?,
        intent_actor: row.try_get("intent_actor")?,
        pnl: row.try_get("pnl")?,
        allocated_capital: row.try_get("allocated_capital")?,
        open_qty: row.try_get("open_qty")?,
        avg_entry: row.try_get("avg_entry")?,
        ltp: row.try_get("ltp")?,
        win_rate: row.try_get("win_rate")?,
        total_trades: row.try_get("total_trades")?,
        winning_trades: row.try_get("winning_trades")?,
        net_delta: row.try_get("net_delta")?,
        drawdown_pct: row.try_get("drawdown_pct")?,
        max_dd_pct: row.try_get("max_dd_pct")?,
        risk_pct: row.try_get("risk_pct")?,
        direction_bias: row.try_get("direction_bias")?,
        current_signal: row.try_get("current_signal")?,
        symbol: row.try_get("symbol")?,
        strategy_type: row.try_get("strategy_type")?,
        error_message: row.try_get("error_message")?,
        error_trace: row.try_get("error_trace")?,
        error_count: row.try_get("error_count")?,
        last_error_at: row.try_get("last_error_at")?,
        last_good_at: row.try_get("last_good_at")?,
        restart_count: row.try_get("restart_count")?,
        auto_restart: row.try_get("auto_restart")?,
        last_trade_at: row.try_get("last_trade_at")?,
        last_tick_at: row.try_get("last_tick_at")?,
        started_at: row.try_get("started_at")?,
    })
}

/// Registers a strategy name if absent. Idempotent: re-registering an already-known
/// strategy is a no-op, matching the executor's registration semantics.
pub async fn ensure_registered(
    pool: &PgPool,
    strategy_name: &str,
    symbol: Option<&str>,
    strategy_type: Option<&str>,
) -> Result<StrategyState> {
    sqlx::query(
        r#"
        insert into strategy_states (strategy_name, symbol, strategy_type)
        values ($1, $2, $3)
        on conflict (strategy_name) do nothing
        "#,
    )
    .bind(strategy_name)
    .bind(symbol)
    .bind(strategy_type)
    .execute(pool)
    .await
    .context("ensure_registered insert failed")?;

    fetch_by_name(pool, strategy_name)
        .await?
        .context("strategy_states row missing immediately after ensure_registered")
}

pub async fn fetch_by_name(pool: &PgPool, strategy_name: &str) -> Result<Option<StrategyState>> {
    let row = sqlx::query(&format!(
        "select {STRATEGY_STATE_COLUMNS} from strategy_states where strategy_name = $1"
    ))
    .bind(strategy_name)
    .fetch_optional(pool)
    .await
    .context("fetch_by_name failed")?;
    row.as_ref().map(row_to_state).transpose()
}

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<StrategyState>> {
    let rows = sqlx::query(&format!(
        "select {STRATEGY_STATE_COLUMNS} from strategy_states order by strategy_name"
    ))
    .fetch_all(pool)
    .await
    .context("fetch_all strategy_states failed")?;
    rows.iter().map(row_to_state).collect()
}

/// Sets a pending control intent. Does not change `status` — that only happens on ack.
pub async fn set_pending_intent(
    pool: &PgPool,
    strategy_name: &str,
    intent: &str,
    actor: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        update strategy_states
        set control_intent = $2, intent_set_at = now(), intent_acked_at = null, intent_actor = $3
        where strategy_name = $1
        "#,
    )
    .bind(strategy_name)
    .bind(intent)
    .bind(actor)
    .execute(pool)
    .await
    .context("set_pending_intent failed")?;
    Ok(())
}

/// Executor-side ack: clears the pending intent and applies the resulting status.
pub async fn acknowledge_intent(
    pool: &PgPool,
    strategy_name: &str,
    resulting_status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        update strategy_states
        set status = $2, control_intent = null, intent_acked_at = now()
        where strategy_name = $1
        "#,
    )
    .bind(strategy_name)
    .bind(resulting_status)
    .execute(pool)
    .await
    .context("acknowledge_intent failed")?;
    Ok(())
}

pub async fn record_tick(pool: &PgPool, strategy_name: &str, ltp: f64) -> Result<()> {
    sqlx::query("update strategy_states set ltp = $2, last_tick_at = now() where strategy_name = $1")
        .bind(strategy_name)
        .bind(ltp)
        .execute(pool)
        .await
        .context("record_tick failed")?;
    Ok(())
}

pub async fn record_signal(pool: &PgPool, strategy_name: &str, signal: &str) -> Result<()> {
    sqlx::query("update strategy_states set current_signal = $2 where strategy_name = $1")
        .bind(strategy_name)
        .bind(signal)
        .execute(pool)
        .await
        .context("record_signal failed")?;
    Ok(())
}

pub async fn record_error(
    pool: &PgPool,
    strategy_name: &str,
    message: &str,
    trace: Option<&str>,
) -> Result<i32> {
    let row = sqlx::query(
        r#"
        update strategy_states
        set error_message = $2, error_trace = $3, error_count = error_count + 1, last_error_at = now()
        where strategy_name = $1
        returning error_count
        "#,
    )
    .bind(strategy_name)
    .bind(message)
    .bind(trace)
    .fetch_one(pool)
    .await
    .context("record_error failed")?;
    Ok(row.try_get("error_count")?)
}

/// Bumps the restart counter; the caller decides whether the new count crosses the
/// auto-disable threshold.
pub async fn record_restart(pool: &PgPool, strategy_name: &str) -> Result<i32> {
    let row = sqlx::query(
        "update strategy_states set restart_count = restart_count + 1, started_at = now() where strategy_name = $1 returning restart_count",
    )
    .bind(strategy_name)
    .fetch_one(pool)
    .await
    .context("record_restart failed")?;
    Ok(row.try_get("restart_count")?)
}

pub async fn record_good_cycle(pool: &PgPool, strategy_name: &str) -> Result<()> {
    sqlx::query("update strategy_states set last_good_at = now() where strategy_name = $1")
        .bind(strategy_name)
        .execute(pool)
        .await
        .context("record_good_cycle failed")?;
    Ok(())
}

pub async fn disable_auto_restart(pool: &PgPool, strategy_name: &str) -> Result<()> {
    sqlx::query("update strategy_states set auto_restart = false where strategy_name = $1")
        .bind(strategy_name)
        .execute(pool)
        .await
        .context("disable_auto_restart failed")?;
    Ok(())
}

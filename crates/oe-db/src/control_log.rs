use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct ControlLogEntry {
    pub id: i32,
    pub strategy_name: String,
    pub action: String,
    pub actor: String,
    pub ip_address: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub acked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ack_latency_ms: Option<i32>,
    pub notes: Option<String>,
}

/// Appends an intent row. The table is insert-only (enforced by `scl_immutable`); the
/// matching ack is recorded via `record_ack`, never by updating this row after the fact
/// outside that helper.
pub async fn record_intent(
    pool: &PgPool,
    strategy_name: &str,
    action: &str,
    actor: &str,
    ip_address: Option<&str>,
    from_status: &str,
    to_status: &str,
) -> Result<i32> {
    let row = sqlx::query(
        r#"
        insert into strategy_control_log (strategy_name, action, actor, ip_address, from_status, to_status)
        values ($1, $2, $3, $4, $5, $6)
        returning id
        "#,
    )
    .bind(strategy_name)
    .bind(action)
    .bind(actor)
    .bind(ip_address)
    .bind(from_status)
    .bind(to_status)
    .fetch_one(pool)
    .await
    .context("record_intent failed")?;
    Ok(row.try_get("id")?)
}

/// Records the ack timestamp and latency for the most recent un-acked intent row for
/// `strategy_name`, via a targeted subquery rather than an update-in-place (the trigger
/// forbids updates entirely — acks append their own row instead).
pub async fn record_ack(
    pool: &PgPool,
    strategy_name: &str,
    ack_latency_ms: i32,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into strategy_control_log (strategy_name, action, actor, from_status, to_status, acked_at, ack_latency_ms, notes)
        select strategy_name, 'ACK', 'executor', from_status, to_status, now(), $2, $3
        from strategy_control_log
        where strategy_name = $1 and action != 'ACK'
        order by created_at desc
        limit 1
        "#,
    )
    .bind(strategy_name)
    .bind(ack_latency_ms)
    .bind(notes)
    .execute(pool)
    .await
    .context("record_ack failed")?;
    Ok(())
}

pub async fn fetch_recent(pool: &PgPool, strategy_name: &str, limit: i64) -> Result<Vec<ControlLogEntry>> {
    let rows = sqlx::query(
        r#"
        select id, strategy_name, action, actor, ip_address, from_status, to_status, acked_at, ack_latency_ms, notes
        from strategy_control_log
        where strategy_name = $1
        order by created_at desc
        limit $2
        "#,
    )
    .bind(strategy_name)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_recent control log failed")?;

    rows.iter()
        .map(|row| {
            Ok(ControlLogEntry {
                id: row.try_get("id")?,
                strategy_name: row.try_get("strategy_name")?,
                action: row.try_get("action")?,
                actor: row.try_get("actor")?,
                ip_address: row.try_get("ip_address")?,
                from_status: row.try_get("from_status")?,
                to_status: row.try_get("to_status")?,
                acked_at: row.try_get("acked_at")?,
                ack_latency_ms: row.try_get("ack_latency_ms")?,
                notes: row.try_get("notes")?,
            })
        })
        .collect()
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReconciliationLog {
    pub id: Uuid,
    pub run_at: DateTime<Utc>,
    pub status: String,
    pub positions_checked: i32,
    pub orders_checked: i32,
    pub mismatches: Value,
    pub corrections: Value,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
}

fn row_to_log(row: &sqlx::postgres::PgRow) -> Result<ReconciliationLog> {
    Ok(ReconciliationLog {
        id: row.try_get("id")?,
        run_at: row.try_get("run_at")?,
        status: row.try_get("status")?,
        positions_checked: row.try_get("positions_checked")?,
        orders_checked: row.try_get("orders_checked")?,
        mismatches: row.try_get("mismatches")?,
        corrections: row.try_get("corrections")?,
        error_message: row.try_get("error_message")?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct NewReconciliationLog {
    pub status: String,
    pub positions_checked: i32,
    pub orders_checked: i32,
    pub mismatches: Value,
    pub corrections: Value,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
}

pub async fn insert(pool: &PgPool, log: &NewReconciliationLog) -> Result<ReconciliationLog> {
    let row = sqlx::query(
        r#"
        insert into reconciliation_logs
            (status, positions_checked, orders_checked, mismatches, corrections, error_message, duration_ms)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id, run_at, status, positions_checked, orders_checked, mismatches, corrections, error_message, duration_ms
        "#,
    )
    .bind(&log.status)
    .bind(log.positions_checked)
    .bind(log.orders_checked)
    .bind(&log.mismatches)
    .bind(&log.corrections)
    .bind(&log.error_message)
    .bind(log.duration_ms)
    .fetch_one(pool)
    .await
    .context("insert reconciliation log failed")?;
    row_to_log(&row)
}

pub async fn fetch_recent(pool: &PgPool, limit: i64) -> Result<Vec<ReconciliationLog>> {
    let rows = sqlx::query(
        r#"
        select id, run_at, status, positions_checked, orders_checked, mismatches, corrections, error_message, duration_ms
        from reconciliation_logs
        order by run_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_recent reconciliation logs failed")?;
    rows.iter().map(row_to_log).collect()
}

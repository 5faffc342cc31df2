use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuditLog {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub ip_address: Option<String>,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

fn row_to_log(row: &sqlx::postgres::PgRow) -> Result<AuditLog> {
    Ok(AuditLog {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        event_type: row.try_get("event_type")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        actor: row.try_get("actor")?,
        ip_address: row.try_get("ip_address")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditLog<'a> {
    pub session_id: Option<Uuid>,
    pub event_type: &'a str,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<&'a str>,
    pub actor: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub payload: Option<Value>,
}

/// Appends one row. `audit_logs` is insert-only (`audit_log_immutable` trigger forbids
/// update/delete) — there is no corresponding `update`/`delete` function in this module.
pub async fn record(pool: &PgPool, entry: NewAuditLog<'_>) -> Result<AuditLog> {
    let row = sqlx::query(
        r#"
        insert into audit_logs (session_id, event_type, entity_type, entity_id, actor, ip_address, payload)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id, session_id, event_type, entity_type, entity_id, actor, ip_address, payload, created_at
        "#,
    )
    .bind(entry.session_id)
    .bind(entry.event_type)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.actor)
    .bind(entry.ip_address)
    .bind(entry.payload)
    .fetch_one(pool)
    .await
    .context("record audit log failed")?;
    row_to_log(&row)
}

pub async fn fetch_by_entity(
    pool: &PgPool,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditLog>> {
    let rows = sqlx::query(
        r#"
        select id, session_id, event_type, entity_type, entity_id, actor, ip_address, payload, created_at
        from audit_logs
        where entity_type = $1 and entity_id = $2
        order by created_at asc
        "#,
    )
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(pool)
    .await
    .context("fetch_by_entity audit logs failed")?;
    rows.iter().map(row_to_log).collect()
}

pub async fn fetch_recent_for_session(pool: &PgPool, session_id: Uuid, limit: i64) -> Result<Vec<AuditLog>> {
    let rows = sqlx::query(
        r#"
        select id, session_id, event_type, entity_type, entity_id, actor, ip_address, payload, created_at
        from audit_logs
        where session_id = $1
        order by created_at desc
        limit $2
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_recent_for_session audit logs failed")?;
    rows.iter().map(row_to_log).collect()
}

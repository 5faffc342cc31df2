//! Thin, domain-aware wrapper over `oe_db::audit`: named convenience functions for the
//! handful of event types the rest of the engine actually records, so a caller writes
//! `audit::kill_switch_triggered(...)` instead of assembling a raw JSON payload inline.
//!
//! The append-only guarantee comes from Postgres itself (`audit_log_immutable` trigger
//! on `audit_logs`), not from an application-level hash chain — a single shared
//! database table is the thing every process agrees on, so there's nothing left for an
//! in-process chain to protect against that the trigger doesn't already cover.
use anyhow::Result;
use oe_db::audit::{self, AuditLog};
use sqlx::PgPool;
use uuid::Uuid;

/// `reason` is the bare kill-reason enum value (`MANUAL`, `DAILY_LOSS_BREACH`, ...) —
/// callers must not fold `detail` into it, since `trading_sessions.kill_reason` is an
/// exact-match column. `detail` carries the human-readable context instead.
pub async fn kill_switch_triggered(
    pool: &PgPool,
    session_id: Uuid,
    reason: &str,
    detail: &str,
    actor: &str,
) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: Some(session_id),
            event_type: "KILL_SWITCH_TRIGGERED",
            entity_type: Some("trading_session"),
            entity_id: Some(&session_id.to_string()),
            actor: Some(actor),
            ip_address: None,
            payload: Some(serde_json::json!({ "reason": reason, "detail": detail })),
        },
    )
    .await
}

pub async fn kill_switch_deactivated(pool: &PgPool, session_id: Uuid, actor: &str) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: Some(session_id),
            event_type: "KILL_SWITCH_DEACTIVATED",
            entity_type: Some("trading_session"),
            entity_id: Some(&session_id.to_string()),
            actor: Some(actor),
            ip_address: None,
            payload: None,
        },
    )
    .await
}

pub async fn order_rejected(
    pool: &PgPool,
    session_id: Uuid,
    order_id: Uuid,
    code: &str,
    message: &str,
) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: Some(session_id),
            event_type: "ORDER_REJECTED",
            entity_type: Some("order"),
            entity_id: Some(&order_id.to_string()),
            actor: Some("risk_engine"),
            ip_address: None,
            payload: Some(serde_json::json!({ "code": code, "message": message })),
        },
    )
    .await
}

pub async fn order_placed(pool: &PgPool, session_id: Uuid, order_id: Uuid) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: Some(session_id),
            event_type: "ORDER_PLACED",
            entity_type: Some("order"),
            entity_id: Some(&order_id.to_string()),
            actor: Some("risk_engine"),
            ip_address: None,
            payload: None,
        },
    )
    .await
}

pub async fn strategy_control_action(
    pool: &PgPool,
    strategy_name: &str,
    action: &str,
    actor: &str,
    ip_address: Option<&str>,
) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: None,
            event_type: "STRATEGY_CONTROL_ACTION",
            entity_type: Some("strategy"),
            entity_id: Some(strategy_name),
            actor: Some(actor),
            ip_address,
            payload: Some(serde_json::json!({ "action": action })),
        },
    )
    .await
}

pub async fn reconciliation_correction(
    pool: &PgPool,
    session_id: Uuid,
    symbol: &str,
    detail: serde_json::Value,
) -> Result<AuditLog> {
    audit::record(
        pool,
        audit::NewAuditLog {
            session_id: Some(session_id),
            event_type: "RECONCILIATION_CORRECTION",
            entity_type: Some("position"),
            entity_id: Some(symbol),
            actor: Some("reconciliation_worker"),
            ip_address: None,
            payload: Some(detail),
        },
    )
    .await
}

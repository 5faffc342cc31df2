//! Minimal operational surface: liveness and a point-in-time session snapshot. There is
//! no order-placement or control REST surface here — strategies drive those through
//! `oe_control`/`oe_risk` directly; this process exposes just enough for a health check
//! and an on-call dashboard to see whether the session is killed or reconciling cleanly.
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::{uptime_secs, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(status))
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    ok: bool,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        ok: true,
        service: state.build.service,
        version: state.build.version,
        uptime_secs: uptime_secs(),
    })
}

#[derive(Serialize)]
struct StatusSnapshot {
    session_id: uuid::Uuid,
    is_killed: bool,
    kill_reason: Option<String>,
    realized_pnl: f64,
    unrealized_pnl: f64,
    total_orders: i32,
    rejected_orders: i32,
    last_reconcile_status: String,
    reconcile_failure_count: i32,
    feed_connected: bool,
    feed_state: String,
    feed_age_seconds: Option<f64>,
    feed_reconnect_count: u32,
}

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusSnapshot>, axum::http::StatusCode> {
    let session = oe_db::sessions::fetch_session(&state.pool, state.session_id)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;

    let feed = state.feed.status();

    Ok(Json(StatusSnapshot {
        session_id: session.id,
        is_killed: session.is_killed,
        kill_reason: session.kill_reason,
        realized_pnl: session.realized_pnl,
        unrealized_pnl: session.unrealized_pnl,
        total_orders: session.total_orders,
        rejected_orders: session.rejected_orders,
        last_reconcile_status: session.last_reconcile_status,
        reconcile_failure_count: session.reconcile_failure_count,
        feed_connected: feed.connected,
        feed_state: format!("{:?}", feed.state),
        feed_age_seconds: feed.age_seconds,
        feed_reconnect_count: feed.reconnect_count,
    }))
}

//! Periodic reconciliation worker: every `RECONCILE_INTERVAL_SECONDS`, pulls open
//! positions and non-terminal orders from the database, diffs them against the
//! broker's current view through the pure [`crate::engine::run_cycle`], applies
//! corrections, and records the outcome. Three consecutive run-level failures trip
//! the kill switch — a broker connection the worker can't reach is exactly the kind
//! of blind spot that shouldn't be allowed to run unattended.
use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use oe_broker::BrokerAdapter;
use oe_db::{orders, positions, reconcile_log, sessions};
use oe_schemas::KillReason;
use sqlx::PgPool;
use uuid::Uuid;

use crate::engine::run_cycle;
use crate::types::{CycleReport, CycleStatus, OrderAction, OrphanResolution, PositionAction};

pub const RECONCILE_INTERVAL_SECONDS: u64 = 15;
pub const MAX_RECONCILE_FAILURES: i32 = 3;
const POSITION_LOCK_TIMEOUT_MS: u64 = 5000;

/// Orders stuck in SENDING/ACKNOWLEDGED past this age are presumed orphaned by a crash
/// between submission and the live order-update path picking up their outcome.
pub const ORPHAN_AGE_SECONDS: i64 = 60;

const ORPHAN_REJECT_REASON: &str = "Recovered from orphaned state";

/// Runs reconciliation forever at `RECONCILE_INTERVAL_SECONDS` until the process is
/// killed. Errors from a single cycle are swallowed into a FAILED log entry rather
/// than aborting the loop — a reconciliation worker that dies on the first broker
/// hiccup defeats its own purpose.
pub async fn run_forever(pool: &PgPool, broker: &dyn BrokerAdapter, session_id: Uuid) -> ! {
    let mut ticker = tokio::time::interval(Duration::from_secs(RECONCILE_INTERVAL_SECONDS));
    loop {
        ticker.tick().await;
        if let Err(e) = run_once(pool, broker, session_id).await {
            tracing::error!(error = %e, "reconciliation cycle failed to run");
        }
    }
}

/// Runs a single reconciliation cycle: fetch, diff, correct, persist the outcome.
pub async fn run_once(pool: &PgPool, broker: &dyn BrokerAdapter, session_id: Uuid) -> Result<CycleReport> {
    let started = std::time::Instant::now();

    let outcome = run_once_fallible(pool, broker, session_id).await;

    let duration_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);

    match outcome {
        Ok(report) => {
            let status = report.status();
            apply_corrections(pool, session_id, &report).await?;
            persist_outcome(pool, session_id, &report, status, duration_ms, None).await?;
            Ok(report)
        }
        Err(e) => {
            let failures = sessions::increment_reconcile_failure_count(pool, session_id).await?;
            sessions::record_reconcile_outcome(pool, session_id, CycleStatus::Failed.as_str(), false).await?;
            reconcile_log::insert(
                pool,
                &reconcile_log::NewReconciliationLog {
                    status: CycleStatus::Failed.as_str().to_string(),
                    error_message: Some(e.to_string()),
                    duration_ms: Some(duration_ms),
                    ..Default::default()
                },
            )
            .await?;

            if failures >= MAX_RECONCILE_FAILURES {
                let triggered = sessions::trigger_kill_switch(
                    pool,
                    session_id,
                    KillReason::ReconcileFail.as_str(),
                    "reconciliation_worker",
                )
                .await?;
                if triggered {
                    oe_audit::kill_switch_triggered(
                        pool,
                        session_id,
                        KillReason::ReconcileFail.as_str(),
                        &format!("{failures} consecutive reconciliation failures"),
                        "reconciliation_worker",
                    )
                    .await
                    .ok();
                }
            }
            Err(e)
        }
    }
}

async fn run_once_fallible(pool: &PgPool, broker: &dyn BrokerAdapter, session_id: Uuid) -> Result<CycleReport> {
    let local_positions = positions::fetch_open_positions(pool, session_id).await?;
    let local_orders = orders::fetch_non_terminal_with_broker_id(pool, session_id).await?;
    let orphan_candidates = orders::fetch_orphan_candidates(pool, session_id, ORPHAN_AGE_SECONDS).await?;

    let mut broker_positions = HashMap::new();
    for p in &local_positions {
        if let Some(bp) = broker.position_for(&p.symbol).await? {
            broker_positions.insert(p.symbol.clone(), bp);
        }
    }

    let broker_orders: HashMap<String, oe_broker::types::BrokerOrder> = broker
        .orders()
        .await?
        .into_iter()
        .map(|o| (o.broker_order_id.clone(), o))
        .collect();

    Ok(run_cycle(&local_positions, &broker_positions, &local_orders, &broker_orders, &orphan_candidates))
}

async fn apply_corrections(pool: &PgPool, session_id: Uuid, report: &CycleReport) -> Result<()> {
    for p in &report.positions {
        let Some(tx) = oe_lock::begin_position_lock(pool, session_id, &p.symbol, POSITION_LOCK_TIMEOUT_MS).await?
        else {
            tracing::warn!(symbol = %p.symbol, "position lock busy, skipping this cycle's correction");
            continue;
        };

        match p.action {
            PositionAction::Ok => positions::mark_reconciled_ok(pool, p.position_id, None).await?,
            PositionAction::Correct { broker_net_quantity } => {
                positions::correct_net_quantity(pool, p.position_id, broker_net_quantity).await?;
                oe_audit::reconciliation_correction(
                    pool,
                    session_id,
                    &p.symbol,
                    serde_json::json!({
                        "local_net_quantity": p.local_net_quantity,
                        "broker_net_quantity": broker_net_quantity,
                    }),
                )
                .await?;
            }
        }

        tx.commit().await.ok();
    }

    for o in &report.orders {
        if let OrderAction::MarkFilled { filled_quantity, avg_fill_price } = o.action {
            orders::mark_filled(pool, o.order_id, filled_quantity, avg_fill_price).await?;
        }
        // OrphanLocal orders are surfaced in the reconciliation log for a human to
        // inspect; the worker doesn't guess whether they were cancelled or rejected.
    }

    for recovery in &report.orphans {
        match &recovery.resolution {
            OrphanResolution::ResolveToBroker { status, filled_quantity, avg_fill_price } => {
                if *status == oe_schemas::OrderStatus::Filled {
                    orders::mark_filled(pool, recovery.order_id, *filled_quantity, *avg_fill_price).await?;
                } else {
                    orders::transition_status(
                        pool,
                        recovery.order_id,
                        status.as_str(),
                        "reconciliation_worker",
                        Some("recovered from orphaned state, broker status adopted"),
                    )
                    .await?;
                }
            }
            OrphanResolution::Reject => {
                orders::reject(pool, recovery.order_id, ORPHAN_REJECT_REASON, None).await?;
            }
        }
    }

    Ok(())
}

async fn persist_outcome(
    pool: &PgPool,
    session_id: Uuid,
    report: &CycleReport,
    status: CycleStatus,
    duration_ms: i32,
    error_message: Option<String>,
) -> Result<()> {
    let mismatches: Vec<_> = report
        .positions
        .iter()
        .filter(|p| p.action != PositionAction::Ok)
        .map(|p| serde_json::json!({ "symbol": p.symbol, "action": "position_corrected" }))
        .chain(
            report
                .orders
                .iter()
                .filter(|o| o.action != OrderAction::NoChange)
                .map(|o| serde_json::json!({ "broker_order_id": o.broker_order_id, "action": "order_drift" })),
        )
        .chain(
            report
                .orphans
                .iter()
                .map(|o| serde_json::json!({ "order_id": o.order_id, "action": "orphan_recovered" })),
        )
        .collect();

    reconcile_log::insert(
        pool,
        &reconcile_log::NewReconciliationLog {
            status: status.as_str().to_string(),
            positions_checked: report.positions.len() as i32,
            orders_checked: report.orders.len() as i32,
            mismatches: serde_json::json!(mismatches),
            corrections: serde_json::json!(mismatches.len()),
            error_message,
            duration_ms: Some(duration_ms),
        },
    )
    .await?;

    sessions::record_reconcile_outcome(pool, session_id, status.as_str(), true).await?;
    Ok(())
}

//! The async shell around `engine::evaluate`: acquires the cross-process lock, pulls
//! live margin through the funds circuit breaker, re-reads the session row, and
//! persists whatever the pure function decided.
use anyhow::Result;
use oe_broker::BrokerAdapter;
use oe_circuit::{Gate, Service};
use oe_db::{orders, sessions};
use oe_schemas::ErrorCode;
use sqlx::PgPool;
use uuid::Uuid;

use crate::engine::evaluate;
use crate::types::{MarginSnapshot, OrderRequest, RiskInputs, RiskOutcome, SessionRiskState};

const RISK_LOCK_TIMEOUT_MS: u64 = 5000;

/// Mirrors `RiskOutcome` but owns a message for the caller and is what the daemon's API
/// layer actually matches on.
#[derive(Debug, Clone)]
pub enum Decision {
    Approved { order_id: Uuid },
    Rejected { code: ErrorCode, message: String },
}

pub async fn validate_and_place(
    pool: &PgPool,
    broker: &dyn BrokerAdapter,
    session_id: Uuid,
    order: OrderRequest,
    idempotency_key: &str,
) -> Result<Decision> {
    let Some(mut tx) = oe_lock::begin_risk_lock(pool, session_id, RISK_LOCK_TIMEOUT_MS).await? else {
        return Ok(Decision::Rejected {
            code: ErrorCode::LockTimeout,
            message: "risk engine busy, retry in a moment".to_string(),
        });
    };

    let session = sessions::lock_session_row_for_update(&mut tx, session_id).await?;

    if session.is_killed {
        tx.rollback().await.ok();
        return Ok(Decision::Rejected {
            code: ErrorCode::KillSwitchActive,
            message: format!(
                "trading halted: {}",
                session.kill_reason.as_deref().unwrap_or("unspecified")
            ),
        });
    }

    let idempotency_exists = orders::exists_by_idempotency_key(pool, idempotency_key).await?;

    let gate = oe_circuit::check(pool, Service::Funds).await?;
    if gate == Gate::Deny {
        tx.rollback().await.ok();
        return Ok(Decision::Rejected {
            code: ErrorCode::CircuitOpenFunds,
            message: "margin verification temporarily unavailable, order blocked for safety".to_string(),
        });
    }

    let margin = match broker.funds().await {
        Ok(funds) => {
            oe_circuit::record_success(pool, Service::Funds).await.ok();
            MarginSnapshot {
                available_margin: funds.available_margin,
                used_margin: funds.used_margin,
            }
        }
        Err(e) => {
            oe_circuit::record_failure(pool, Service::Funds).await.ok();
            tracing::error!(error = %e, "margin fetch failed");
            tx.rollback().await.ok();
            return Ok(Decision::Rejected {
                code: ErrorCode::MarginFetchFailed,
                message: "cannot verify margin with broker, order blocked".to_string(),
            });
        }
    };

    let open_position_count =
        oe_db::positions::count_open_positions(pool, session_id).await? as i32;

    let estimated_price = match order.price {
        Some(p) => p,
        None => broker.quote(&order.symbol).await.map(|q| q.ltp).unwrap_or(0.0),
    };

    // Re-read after the broker round trip — a concurrent manual kill between lock
    // acquisition and now must still be caught.
    let killed_after_margin_fetch = sessions::fetch_session(pool, session_id).await?.is_killed;

    let inputs = RiskInputs {
        order: order.clone(),
        session: SessionRiskState {
            is_killed: session.is_killed,
            kill_reason: session.kill_reason.clone(),
            realized_pnl: session.realized_pnl,
            unrealized_pnl: session.unrealized_pnl,
            max_daily_loss: session.max_daily_loss,
            max_open_orders: session.max_open_orders,
            max_margin_usage_pct: session.max_margin_usage_pct,
            max_lot_size: session.max_lot_size,
        },
        margin,
        idempotency_exists,
        open_position_count,
        estimated_price,
        margin_rate: 0.15,
        killed_after_margin_fetch,
    };

    let outcome = evaluate(&inputs);
    tx.commit().await.ok();

    match outcome {
        RiskOutcome::Approved(approval) => {
            let snapshot = serde_json::json!({
                "margin_pct": approval.margin_pct,
                "day_pnl": approval.day_pnl,
                "open_positions": approval.open_positions,
                "est_margin_req": approval.estimated_margin,
                "lots": approval.lots,
                "lock_type": "pg_advisory_xact_lock",
            });

            let new_order = orders::NewOrder {
                session_id,
                idempotency_key: idempotency_key.to_string(),
                symbol: order.symbol.clone(),
                display_symbol: order.symbol.clone(),
                side: order.side.as_str().to_string(),
                order_type: order.order_type.as_str().to_string(),
                product_type: order.product_type.as_str().to_string(),
                quantity: order.quantity,
                price: order.price,
                trigger_price: None,
            };

            let Some(inserted) = orders::insert_order_if_absent(pool, &new_order).await? else {
                return Ok(Decision::Rejected {
                    code: ErrorCode::DuplicateOrder,
                    message: "order with this idempotency key already processed".to_string(),
                });
            };
            orders::set_risk_snapshot(pool, inserted.id, &snapshot).await?;
            sessions::increment_order_counters(pool, session_id, false).await?;
            oe_audit::order_placed(pool, session_id, inserted.id).await.ok();

            Ok(Decision::Approved { order_id: inserted.id })
        }
        RiskOutcome::Rejected {
            code,
            message,
            trip_kill_switch,
        } => {
            if let Some((reason, detail)) = trip_kill_switch {
                let triggered =
                    sessions::trigger_kill_switch(pool, session_id, reason.as_str(), "risk_engine").await?;
                if triggered {
                    oe_audit::kill_switch_triggered(pool, session_id, reason.as_str(), &detail, "risk_engine")
                        .await
                        .ok();
                }
            }
            sessions::increment_order_counters(pool, session_id, true).await.ok();
            Ok(Decision::Rejected { code, message })
        }
    }
}

/// Manual, unconditional kill-switch deactivation. Unlike a trigger, there's no
/// first-wins race to resolve — an operator clearing the switch always wins.
pub async fn deactivate_kill_switch(pool: &PgPool, session_id: Uuid, actor: &str) -> Result<()> {
    sessions::deactivate_kill_switch(pool, session_id).await?;
    oe_audit::kill_switch_deactivated(pool, session_id, actor).await.ok();
    Ok(())
}

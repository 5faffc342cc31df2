//! The nine-step risk decision sequence. Deterministic, synchronous, no I/O — every
//! input has already been fetched by the async shell in `orchestrate`. Order matches the
//! checks one-for-one: a rejection at step N never evaluates step N+1.
use oe_schemas::{ErrorCode, KillReason};

use crate::types::{RiskInputs, RiskOutcome, RiskApproval};

pub fn evaluate(inputs: &RiskInputs) -> RiskOutcome {
    // 1. Kill switch, checked first against the freshest session row the caller has.
    if inputs.session.is_killed {
        return reject(
            ErrorCode::KillSwitchActive,
            format!(
                "trading halted: {}",
                inputs.session.kill_reason.as_deref().unwrap_or("unspecified")
            ),
            None,
        );
    }

    // 2. Idempotency — the unique constraint is the real guard, this is the early exit.
    if inputs.idempotency_exists {
        return reject(
            ErrorCode::DuplicateOrder,
            "order with this idempotency key already processed".to_string(),
            None,
        );
    }

    // 3 happens in the shell (broker funds call through the circuit breaker); its
    // result arrives here as `inputs.margin`.

    // 4. Margin utilization.
    let margin_pct = inputs.margin.utilization_pct();
    if margin_pct >= inputs.session.max_margin_usage_pct {
        return reject(
            ErrorCode::MarginLimitBreach,
            format!(
                "margin {margin_pct:.1}% exceeds limit {:.0}%",
                inputs.session.max_margin_usage_pct
            ),
            Some((
                KillReason::MarginBreach,
                format!(
                    "margin {margin_pct:.1}% >= limit {:.0}%",
                    inputs.session.max_margin_usage_pct
                ),
            )),
        );
    }

    // 5. Daily loss limit.
    let day_pnl = inputs.session.realized_pnl + inputs.session.unrealized_pnl;
    if day_pnl < -inputs.session.max_daily_loss.abs() {
        return reject(
            ErrorCode::DailyLossBreach,
            format!(
                "daily loss limit {:.0} breached",
                inputs.session.max_daily_loss
            ),
            Some((
                KillReason::DailyLossBreach,
                format!(
                    "day P&L {day_pnl:.2} breached limit {:.2}",
                    -inputs.session.max_daily_loss.abs()
                ),
            )),
        );
    }

    // 6. Max open positions.
    if inputs.open_position_count >= inputs.session.max_open_orders {
        return reject(
            ErrorCode::MaxPositionsReached,
            format!("max open positions ({}) reached", inputs.session.max_open_orders),
            None,
        );
    }

    // 7. Lot size.
    let lots = if inputs.order.lot_size > 0 {
        inputs.order.quantity as f64 / inputs.order.lot_size as f64
    } else {
        0.0
    };
    if lots > inputs.session.max_lot_size as f64 {
        return reject(
            ErrorCode::LotSizeExceeded,
            format!("order {lots:.0} lots exceeds max {} lots", inputs.session.max_lot_size),
            None,
        );
    }

    // 8. Estimated margin against available margin.
    let price = inputs.order.price.unwrap_or(inputs.estimated_price);
    let estimated_margin = inputs.order.quantity as f64 * price * inputs.margin_rate;
    if estimated_margin > inputs.margin.available_margin {
        return reject(
            ErrorCode::InsufficientMargin,
            format!(
                "order needs ~{estimated_margin:.0}, only {:.0} available",
                inputs.margin.available_margin
            ),
            None,
        );
    }

    // 9. Re-check kill switch — it may have flipped while step 3's broker call was
    // in flight.
    if inputs.killed_after_margin_fetch {
        return reject(
            ErrorCode::KillSwitchActive,
            "kill switch activated during risk evaluation".to_string(),
            None,
        );
    }

    RiskOutcome::Approved(RiskApproval {
        margin_pct,
        day_pnl,
        open_positions: inputs.open_position_count,
        estimated_margin,
        lots,
    })
}

fn reject(
    code: ErrorCode,
    message: String,
    trip_kill_switch: Option<(KillReason, String)>,
) -> RiskOutcome {
    RiskOutcome::Rejected {
        code,
        message,
        trip_kill_switch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarginSnapshot, OrderRequest, SessionRiskState};
    use oe_schemas::{OrderType, ProductType, Side};

    fn base_inputs() -> RiskInputs {
        RiskInputs {
            order: OrderRequest {
                symbol: "NIFTY24AUGFUT".to_string(),
                side: Side::Buy,
                order_type: OrderType::Market,
                product_type: ProductType::Mis,
                quantity: 50,
                price: Some(200.0),
                lot_size: 50,
            },
            session: SessionRiskState {
                is_killed: false,
                kill_reason: None,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                max_daily_loss: 10_000.0,
                max_open_orders: 10,
                max_margin_usage_pct: 80.0,
                max_lot_size: 5,
            },
            margin: MarginSnapshot {
                available_margin: 100_000.0,
                used_margin: 10_000.0,
            },
            idempotency_exists: false,
            open_position_count: 1,
            estimated_price: 200.0,
            margin_rate: 0.15,
            killed_after_margin_fetch: false,
        }
    }

    #[test]
    fn approves_a_clean_order() {
        match evaluate(&base_inputs()) {
            RiskOutcome::Approved(_) => {}
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn kill_switch_rejects_before_anything_else() {
        let mut inputs = base_inputs();
        inputs.session.is_killed = true;
        inputs.idempotency_exists = true; // would also fail, but kill switch wins
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::KillSwitchActive),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_idempotency_key_is_rejected() {
        let mut inputs = base_inputs();
        inputs.idempotency_exists = true;
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::DuplicateOrder),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn margin_breach_trips_kill_switch() {
        let mut inputs = base_inputs();
        inputs.margin = MarginSnapshot {
            available_margin: 10_000.0,
            used_margin: 90_000.0,
        };
        match evaluate(&inputs) {
            RiskOutcome::Rejected {
                code,
                trip_kill_switch,
                ..
            } => {
                assert_eq!(code, ErrorCode::MarginLimitBreach);
                assert!(matches!(trip_kill_switch, Some((KillReason::MarginBreach, _))));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn daily_loss_breach_trips_kill_switch() {
        let mut inputs = base_inputs();
        inputs.session.realized_pnl = -11_000.0;
        match evaluate(&inputs) {
            RiskOutcome::Rejected {
                code,
                trip_kill_switch,
                ..
            } => {
                assert_eq!(code, ErrorCode::DailyLossBreach);
                assert!(matches!(trip_kill_switch, Some((KillReason::DailyLossBreach, _))));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn max_open_positions_rejects() {
        let mut inputs = base_inputs();
        inputs.open_position_count = 10;
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::MaxPositionsReached),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn lot_size_exceeded_rejects() {
        let mut inputs = base_inputs();
        inputs.order.quantity = 50 * 6; // 6 lots > max 5
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::LotSizeExceeded),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn insufficient_margin_rejects() {
        let mut inputs = base_inputs();
        inputs.margin.available_margin = 10.0;
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::InsufficientMargin),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn recheck_catches_concurrent_kill() {
        let mut inputs = base_inputs();
        inputs.killed_after_margin_fetch = true;
        match evaluate(&inputs) {
            RiskOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::KillSwitchActive),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}

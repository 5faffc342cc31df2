use oe_broker::types::{BrokerOrder, BrokerPosition};
use oe_db::orders::Order;
use oe_db::positions::Position;

use crate::types::{compare_order, compare_position, resolve_orphan, CycleReport, OrphanRecovery};

/// Pure comparison step of one reconciliation cycle: diffs the local rows the caller
/// fetched against the broker's current view, symbol-indexed for positions and
/// broker-order-id-indexed for orders, and resolves any crash-orphaned orders the
/// caller found stuck in SENDING/ACKNOWLEDGED past the age threshold. Produces no side
/// effects — the caller applies `CycleReport`'s corrections afterward.
pub fn run_cycle(
    local_positions: &[Position],
    broker_positions: &std::collections::HashMap<String, BrokerPosition>,
    local_orders: &[Order],
    broker_orders: &std::collections::HashMap<String, BrokerOrder>,
    orphan_candidates: &[Order],
) -> CycleReport {
    let positions = local_positions
        .iter()
        .map(|p| compare_position(p, broker_positions.get(&p.symbol)))
        .collect();

    let orders = local_orders
        .iter()
        .map(|o| {
            let broker = o.broker_order_id.as_deref().and_then(|id| broker_orders.get(id));
            compare_order(o, broker)
        })
        .collect();

    let orphans = orphan_candidates
        .iter()
        .map(|o| {
            let broker = o.broker_order_id.as_deref().and_then(|id| broker_orders.get(id));
            OrphanRecovery { order_id: o.id, resolution: resolve_orphan(broker) }
        })
        .collect();

    CycleReport { positions, orders, orphans }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderAction, PositionAction};
    use chrono::Utc;
    use oe_schemas::BrokerOrderStatus;
    use std::collections::HashMap;

    fn position(symbol: &str, net_quantity: i32) -> Position {
        Position {
            id: uuid::Uuid::new_v4(),
            session_id: uuid::Uuid::nil(),
            symbol: symbol.to_string(),
            display_symbol: symbol.to_string(),
            product_type: "MIS".to_string(),
            net_quantity,
            buy_quantity: net_quantity.max(0),
            sell_quantity: 0,
            avg_buy_price: 0.0,
            avg_sell_price: 0.0,
            ltp: None,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            broker_quantity: None,
            reconcile_status: "OK".to_string(),
            last_reconciled_at: None,
        }
    }

    fn order(broker_order_id: Option<&str>, status: &str) -> Order {
        Order {
            id: uuid::Uuid::new_v4(),
            session_id: uuid::Uuid::nil(),
            idempotency_key: "k".to_string(),
            symbol: "NIFTY24AUGFUT".to_string(),
            display_symbol: "NIFTY".to_string(),
            side: "BUY".to_string(),
            order_type: "MARKET".to_string(),
            product_type: "MIS".to_string(),
            quantity: 50,
            price: None,
            trigger_price: None,
            validity: "DAY".to_string(),
            status: status.to_string(),
            status_history: serde_json::json!([]),
            broker_order_id: broker_order_id.map(|s| s.to_string()),
            filled_quantity: 0,
            avg_fill_price: None,
            fill_timestamp: None,
            risk_snapshot: None,
            reject_reason: None,
            broker_reject_code: None,
            created_at: Utc::now(),
            sent_at: None,
            acked_at: None,
        }
    }

    #[test]
    fn clean_cycle_when_everything_matches() {
        let local_positions = vec![position("NIFTY24AUGFUT", 50)];
        let mut broker_positions = HashMap::new();
        broker_positions.insert("NIFTY24AUGFUT".to_string(), BrokerPosition { net_quantity: 50 });

        let local_orders = vec![order(Some("bo-1"), "ACKNOWLEDGED")];
        let mut broker_orders = HashMap::new();
        broker_orders.insert(
            "bo-1".to_string(),
            BrokerOrder {
                broker_order_id: "bo-1".to_string(),
                symbol: "NIFTY24AUGFUT".to_string(),
                side: oe_schemas::Side::Buy,
                quantity: 50,
                filled_quantity: 0,
                avg_fill_price: None,
                status: BrokerOrderStatus::Pending,
            },
        );

        let report = run_cycle(&local_positions, &broker_positions, &local_orders, &broker_orders, &[]);
        assert_eq!(report.positions[0].action, PositionAction::Ok);
        assert_eq!(report.orders[0].action, OrderAction::NoChange);
        assert!(report.orphans.is_empty());
    }

    #[test]
    fn divergent_quantity_is_flagged_for_correction() {
        let local_positions = vec![position("NIFTY24AUGFUT", 50)];
        let mut broker_positions = HashMap::new();
        broker_positions.insert("NIFTY24AUGFUT".to_string(), BrokerPosition { net_quantity: 25 });

        let report = run_cycle(&local_positions, &broker_positions, &[], &HashMap::new(), &[]);
        assert_eq!(
            report.positions[0].action,
            PositionAction::Correct { broker_net_quantity: 25 }
        );
    }

    #[test]
    fn orphan_candidate_with_no_broker_record_is_recovered_as_rejected() {
        let orphan = order(None, "SENDING");
        let report = run_cycle(&[], &HashMap::new(), &[], &HashMap::new(), &[orphan.clone()]);
        assert_eq!(
            report.orphans,
            vec![crate::types::OrphanRecovery {
                order_id: orphan.id,
                resolution: crate::types::OrphanResolution::Reject,
            }]
        );
    }
}

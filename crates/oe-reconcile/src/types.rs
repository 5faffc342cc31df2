use oe_broker::types::{BrokerOrder, BrokerPosition};
use oe_db::orders::Order;
use oe_db::positions::Position;
use oe_schemas::{BrokerOrderStatus, OrderStatus};

/// What a single position's local-vs-broker comparison resolved to. Mismatches are
/// corrected to the broker's number, never halted on — the broker is the source of
/// truth for what's actually held.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    Ok,
    Correct { broker_net_quantity: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionComparison {
    pub position_id: uuid::Uuid,
    pub symbol: String,
    pub local_net_quantity: i32,
    pub action: PositionAction,
}

pub fn compare_position(local: &Position, broker: Option<&BrokerPosition>) -> PositionComparison {
    let broker_net_quantity = broker.map(|b| b.net_quantity).unwrap_or(0);
    let action = if broker_net_quantity == local.net_quantity {
        PositionAction::Ok
    } else {
        PositionAction::Correct { broker_net_quantity }
    };
    PositionComparison {
        position_id: local.id,
        symbol: local.symbol.clone(),
        local_net_quantity: local.net_quantity,
        action,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    NoChange,
    /// Broker shows the order filled but the local row doesn't yet.
    MarkFilled { filled_quantity: i32, avg_fill_price: Option<f64> },
    /// Broker has no record of an order the local row still considers live — most
    /// likely it was rejected or cancelled upstream of acknowledgement.
    OrphanLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderComparison {
    pub order_id: uuid::Uuid,
    pub broker_order_id: String,
    pub action: OrderAction,
}

pub fn compare_order(local: &Order, broker: Option<&BrokerOrder>) -> OrderComparison {
    let broker_order_id = local
        .broker_order_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let action = match broker {
        None => OrderAction::OrphanLocal,
        Some(b) if b.status == BrokerOrderStatus::Filled && local.status != "FILLED" => {
            OrderAction::MarkFilled {
                filled_quantity: b.filled_quantity,
                avg_fill_price: b.avg_fill_price,
            }
        }
        Some(_) => OrderAction::NoChange,
    };

    OrderComparison {
        order_id: local.id,
        broker_order_id,
        action,
    }
}

/// What a SENDING/ACKNOWLEDGED order stuck past the orphan age threshold resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum OrphanResolution {
    /// The broker does have a record after all — adopt its reported status and fill data.
    ResolveToBroker { status: OrderStatus, filled_quantity: i32, avg_fill_price: Option<f64> },
    /// No broker record was found; give up on it rather than leave it stuck forever.
    Reject,
}

/// Resolves one orphan candidate given whatever the broker currently reports for it
/// (looked up by broker order id, which may itself be missing if the broker never saw it).
pub fn resolve_orphan(broker: Option<&BrokerOrder>) -> OrphanResolution {
    match broker {
        Some(b) => OrphanResolution::ResolveToBroker {
            status: b.status.to_order_status(),
            filled_quantity: b.filled_quantity,
            avg_fill_price: b.avg_fill_price,
        },
        None => OrphanResolution::Reject,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrphanRecovery {
    pub order_id: uuid::Uuid,
    pub resolution: OrphanResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Clean,
    Corrected,
    Failed,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStatus::Clean => "CLEAN",
            CycleStatus::Corrected => "CORRECTED",
            CycleStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub positions: Vec<PositionComparison>,
    pub orders: Vec<OrderComparison>,
    pub orphans: Vec<OrphanRecovery>,
}

impl CycleReport {
    pub fn status(&self) -> CycleStatus {
        let any_mismatch = self.positions.iter().any(|p| p.action != PositionAction::Ok)
            || self.orders.iter().any(|o| o.action != OrderAction::NoChange)
            || !self.orphans.is_empty();
        if any_mismatch {
            CycleStatus::Corrected
        } else {
            CycleStatus::Clean
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(net_quantity: i32) -> Position {
        Position {
            id: uuid::Uuid::nil(),
            session_id: uuid::Uuid::nil(),
            symbol: "NIFTY24AUGFUT".to_string(),
            display_symbol: "NIFTY".to_string(),
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

    fn order(status: &str, broker_order_id: Option<&str>) -> Order {
        Order {
            id: uuid::Uuid::nil(),
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
    fn matching_quantity_is_ok() {
        let cmp = compare_position(&position(50), Some(&BrokerPosition { net_quantity: 50 }));
        assert_eq!(cmp.action, PositionAction::Ok);
    }

    #[test]
    fn mismatched_quantity_is_corrected() {
        let cmp = compare_position(&position(50), Some(&BrokerPosition { net_quantity: 30 }));
        assert_eq!(cmp.action, PositionAction::Correct { broker_net_quantity: 30 });
    }

    #[test]
    fn missing_broker_position_treated_as_flat() {
        let cmp = compare_position(&position(50), None);
        assert_eq!(cmp.action, PositionAction::Correct { broker_net_quantity: 0 });
    }

    #[test]
    fn broker_fill_not_yet_local_is_marked_filled() {
        let broker = BrokerOrder {
            broker_order_id: "bo-1".to_string(),
            symbol: "NIFTY24AUGFUT".to_string(),
            side: oe_schemas::Side::Buy,
            quantity: 50,
            filled_quantity: 50,
            avg_fill_price: Some(101.5),
            status: BrokerOrderStatus::Filled,
        };
        let cmp = compare_order(&order("ACKNOWLEDGED", Some("bo-1")), Some(&broker));
        assert_eq!(
            cmp.action,
            OrderAction::MarkFilled { filled_quantity: 50, avg_fill_price: Some(101.5) }
        );
    }

    #[test]
    fn broker_without_record_is_orphan() {
        let cmp = compare_order(&order("ACKNOWLEDGED", Some("bo-2")), None);
        assert_eq!(cmp.action, OrderAction::OrphanLocal);
    }

    #[test]
    fn orphan_with_broker_record_resolves_to_broker_status() {
        let broker = BrokerOrder {
            broker_order_id: "bo-3".to_string(),
            symbol: "NIFTY24AUGFUT".to_string(),
            side: oe_schemas::Side::Buy,
            quantity: 50,
            filled_quantity: 50,
            avg_fill_price: Some(99.0),
            status: BrokerOrderStatus::Filled,
        };
        let resolution = resolve_orphan(Some(&broker));
        assert_eq!(
            resolution,
            OrphanResolution::ResolveToBroker {
                status: OrderStatus::Filled,
                filled_quantity: 50,
                avg_fill_price: Some(99.0),
            }
        );
    }

    #[test]
    fn orphan_with_no_broker_record_is_rejected() {
        assert_eq!(resolve_orphan(None), OrphanResolution::Reject);
    }

    #[test]
    fn cycle_report_status_reflects_mismatches() {
        let clean = CycleReport { positions: vec![], orders: vec![], orphans: vec![] };
        assert_eq!(clean.status(), CycleStatus::Clean);

        let dirty = CycleReport {
            positions: vec![compare_position(&position(50), Some(&BrokerPosition { net_quantity: 10 }))],
            orders: vec![],
            orphans: vec![],
        };
        assert_eq!(dirty.status(), CycleStatus::Corrected);
    }
}

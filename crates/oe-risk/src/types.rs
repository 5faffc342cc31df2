use oe_schemas::{ErrorCode, OrderType, ProductType, Side};

/// Everything the pure decision function needs, already fetched by the async shell.
/// No field here is fetched by `evaluate` itself — fetching live data (margin, open
/// position count, kill-switch state) is the caller's job so the decision stays a plain
/// function of its inputs.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub product_type: ProductType,
    pub quantity: i32,
    pub price: Option<f64>,
    pub lot_size: i32,
}

#[derive(Debug, Clone)]
pub struct SessionRiskState {
    pub is_killed: bool,
    pub kill_reason: Option<String>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub max_daily_loss: f64,
    pub max_open_orders: i32,
    pub max_margin_usage_pct: f64,
    pub max_lot_size: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct MarginSnapshot {
    pub available_margin: f64,
    pub used_margin: f64,
}

impl MarginSnapshot {
    pub fn total(&self) -> f64 {
        let total = self.available_margin + self.used_margin;
        if total == 0.0 {
            1.0
        } else {
            total
        }
    }

    pub fn utilization_pct(&self) -> f64 {
        (self.used_margin / self.total()) * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct RiskInputs {
    pub order: OrderRequest,
    pub session: SessionRiskState,
    pub margin: MarginSnapshot,
    pub idempotency_exists: bool,
    pub open_position_count: i32,
    pub estimated_price: f64,
    /// Margin rate applied to notional to estimate the capital the order would block.
    /// 0.15 for the options/futures products this engine trades.
    pub margin_rate: f64,
    /// Re-read of the kill switch taken after the broker round trip — catches a kill
    /// triggered concurrently while this evaluation was waiting on the network.
    pub killed_after_margin_fetch: bool,
}

#[derive(Debug, Clone)]
pub struct RiskApproval {
    pub margin_pct: f64,
    pub day_pnl: f64,
    pub open_positions: i32,
    pub estimated_margin: f64,
    pub lots: f64,
}

#[derive(Debug, Clone)]
pub enum RiskOutcome {
    Approved(RiskApproval),
    Rejected {
        code: ErrorCode,
        message: String,
        /// Set when this rejection should also trip the kill switch (margin or
        /// daily-loss breach) — the async shell persists both atomically.
        trip_kill_switch: Option<(oe_schemas::KillReason, String)>,
    },
}

use oe_schemas::{BrokerOrderStatus, Side, Tick};

/// Events a streaming subscription can produce, mirroring the broker's own
/// connect/tick/disconnect/error lifecycle rather than flattening everything into a
/// single tick callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Open,
    Tick(Tick),
    Close,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: String,
    pub product_type: String,
    pub quantity: i32,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub broker_order_id: String,
    pub status: BrokerOrderStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOrder {
    pub broker_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i32,
    pub filled_quantity: i32,
    pub avg_fill_price: Option<f64>,
    pub status: BrokerOrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BrokerPosition {
    pub net_quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FundsSnapshot {
    pub available_margin: f64,
    pub used_margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub ltp: f64,
}

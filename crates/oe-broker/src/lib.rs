//! BrokerAdapter trait plus a deterministic in-memory `PaperBroker` test double.
//!
//! The trait is the seam between the risk/execution path and whatever live broker API
//! this deploys against. Production wiring implements it against the real broker's REST
//! and websocket surface; tests and local runs use `PaperBroker`, which never talks to
//! the network and never uses randomness or wall-clock timestamps for its IDs.
use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use oe_schemas::BrokerOrderStatus;
use tokio::sync::mpsc;

pub mod types;

use types::{BrokerOrder, BrokerPosition, FundsSnapshot, OrderAck, OrderRequest, Quote, TickEvent};

/// Depth of the channel returned by `subscribe`. A slow consumer backs the channel up
/// rather than blocking the feed worker's send — tune alongside `RECONNECT_DELAYS` if
/// this ever needs to change.
pub const STREAM_CHANNEL_CAPACITY: usize = 1024;

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn funds(&self) -> Result<FundsSnapshot>;
    async fn quote(&self, symbol: &str) -> Result<Quote>;
    async fn positions(&self) -> Result<Vec<BrokerPosition>>;
    async fn position_for(&self, symbol: &str) -> Result<Option<BrokerPosition>>;
    async fn orders(&self) -> Result<Vec<BrokerOrder>>;
    async fn submit_order(&self, idempotency_key: &str, req: OrderRequest) -> Result<OrderAck>;
    async fn cancel_order(&self, broker_order_id: &str) -> Result<()>;

    /// Opens a streaming tick subscription for `symbols`. The returned receiver yields
    /// `Open` once the connection is live, a `Tick` per update, and `Close`/`Error` when
    /// the stream ends — the caller (the feed worker) owns reconnecting.
    async fn subscribe(&self, symbols: &[String]) -> Result<mpsc::Receiver<TickEvent>>;
}

/// Deterministic paper broker.
///
/// - `broker_order_id` is exactly the `idempotency_key` passed to `submit_order`.
/// - Submitting the same idempotency key twice is a no-op returning the original ack —
///   mirrors how a live broker's own dedupe would behave on a retried request.
/// - Orders accept immediately; nothing auto-fills. Call `fill` explicitly in a test to
///   move an order into FILLED.
#[derive(Debug, Default)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

#[derive(Debug, Default)]
struct PaperState {
    orders: BTreeMap<String, BrokerOrder>,
    positions: BTreeMap<String, BrokerPosition>,
    quotes: BTreeMap<String, Quote>,
    funds: FundsSnapshot,
    stream_sender: Option<mpsc::Sender<TickEvent>>,
}

impl PaperBroker {
    pub fn new(funds: FundsSnapshot) -> Self {
        Self {
            state: Mutex::new(PaperState {
                funds,
                ..Default::default()
            }),
        }
    }

    pub fn set_quote(&self, symbol: &str, ltp: f64) {
        self.state
            .lock()
            .expect("PaperBroker state lock poisoned")
            .quotes
            .insert(symbol.to_string(), Quote { ltp });
    }

    pub fn set_position(&self, symbol: &str, net_quantity: i32) {
        self.state
            .lock()
            .expect("PaperBroker state lock poisoned")
            .positions
            .insert(symbol.to_string(), BrokerPosition { net_quantity });
    }

    /// Deterministically fills a previously submitted order in full at `price`.
    pub fn fill(&self, broker_order_id: &str, price: f64) {
        let mut state = self.state.lock().expect("PaperBroker state lock poisoned");
        if let Some(order) = state.orders.get_mut(broker_order_id) {
            order.filled_quantity = order.quantity;
            order.avg_fill_price = Some(price);
            order.status = BrokerOrderStatus::Filled;
        }
    }

    pub fn reject(&self, broker_order_id: &str) {
        let mut state = self.state.lock().expect("PaperBroker state lock poisoned");
        if let Some(order) = state.orders.get_mut(broker_order_id) {
            order.status = BrokerOrderStatus::Rejected;
        }
    }

    /// Pushes a synthetic tick to whichever `subscribe` caller is currently attached, if
    /// any. Used by tests driving the feed worker against `PaperBroker` without a real
    /// websocket.
    pub fn push_tick(&self, tick: oe_schemas::Tick) {
        if let Some(sender) = self.state.lock().expect("PaperBroker state lock poisoned").stream_sender.clone() {
            let _ = sender.try_send(TickEvent::Tick(tick));
        }
    }

    /// Ends the current subscription, if any, as the broker would on a disconnect.
    pub fn close_stream(&self) {
        if let Some(sender) = self.state.lock().expect("PaperBroker state lock poisoned").stream_sender.take() {
            let _ = sender.try_send(TickEvent::Close);
        }
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn funds(&self) -> Result<FundsSnapshot> {
        Ok(self.state.lock().expect("PaperBroker state lock poisoned").funds)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let state = self.state.lock().expect("PaperBroker state lock poisoned");
        state
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no quote set for {symbol}"))
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(self
            .state
            .lock()
            .expect("PaperBroker state lock poisoned")
            .positions
            .values()
            .copied()
            .collect())
    }

    async fn position_for(&self, symbol: &str) -> Result<Option<BrokerPosition>> {
        Ok(self
            .state
            .lock()
            .expect("PaperBroker state lock poisoned")
            .positions
            .get(symbol)
            .copied())
    }

    async fn orders(&self) -> Result<Vec<BrokerOrder>> {
        Ok(self
            .state
            .lock()
            .expect("PaperBroker state lock poisoned")
            .orders
            .values()
            .cloned()
            .collect())
    }

    async fn submit_order(&self, idempotency_key: &str, req: OrderRequest) -> Result<OrderAck> {
        let mut state = self.state.lock().expect("PaperBroker state lock poisoned");

        if let Some(existing) = state.orders.get(idempotency_key) {
            return Ok(OrderAck {
                broker_order_id: existing.broker_order_id.clone(),
                status: existing.status,
            });
        }

        let order = BrokerOrder {
            broker_order_id: idempotency_key.to_string(),
            symbol: req.symbol,
            side: req.side,
            quantity: req.quantity,
            filled_quantity: 0,
            avg_fill_price: None,
            status: BrokerOrderStatus::Pending,
        };
        state.orders.insert(idempotency_key.to_string(), order.clone());

        Ok(OrderAck {
            broker_order_id: order.broker_order_id,
            status: order.status,
        })
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("PaperBroker state lock poisoned");
        if let Some(order) = state.orders.get_mut(broker_order_id) {
            order.status = BrokerOrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn subscribe(&self, _symbols: &[String]) -> Result<mpsc::Receiver<TickEvent>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let opened = tx.try_send(TickEvent::Open).is_ok();
        self.state.lock().expect("PaperBroker state lock poisoned").stream_sender = Some(tx);
        if !opened {
            anyhow::bail!("paper broker stream channel closed before open");
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oe_schemas::Side;

    fn req(symbol: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: "MARKET".to_string(),
            product_type: "MIS".to_string(),
            quantity: 50,
            price: None,
            trigger_price: None,
        }
    }

    #[tokio::test]
    async fn submit_is_idempotent_on_key() {
        let broker = PaperBroker::new(FundsSnapshot {
            available_margin: 100000.0,
            used_margin: 0.0,
        });
        let a = broker.submit_order("idem-1", req("NIFTY24AUGFUT")).await.unwrap();
        let b = broker.submit_order("idem-1", req("NIFTY24AUGFUT")).await.unwrap();
        assert_eq!(a.broker_order_id, b.broker_order_id);
        assert_eq!(broker.orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fill_moves_order_to_complete() {
        let broker = PaperBroker::new(FundsSnapshot::default());
        let ack = broker.submit_order("idem-2", req("BANKNIFTY24AUGFUT")).await.unwrap();
        broker.fill(&ack.broker_order_id, 450.5);
        let orders = broker.orders().await.unwrap();
        assert_eq!(orders[0].status, BrokerOrderStatus::Filled);
        assert_eq!(orders[0].avg_fill_price, Some(450.5));
    }

    #[tokio::test]
    async fn subscribe_opens_then_delivers_pushed_ticks() {
        let broker = PaperBroker::new(FundsSnapshot::default());
        let mut rx = broker.subscribe(&["NIFTY".to_string()]).await.unwrap();
        assert_eq!(rx.recv().await, Some(TickEvent::Open));

        let tick = oe_schemas::Tick {
            symbol: "NIFTY".to_string(),
            ltp: 100.0,
            ts: chrono::Utc::now(),
            vol: None,
            oi: None,
        };
        broker.push_tick(tick.clone());
        assert_eq!(rx.recv().await, Some(TickEvent::Tick(tick)));

        broker.close_stream();
        assert_eq!(rx.recv().await, Some(TickEvent::Close));
    }
}

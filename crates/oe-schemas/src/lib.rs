//! Shared domain types for the trading engine control plane.
//!
//! Every enum here round-trips through Postgres as `TEXT` via `as_str()`/`parse()`,
//! matching the convention the rest of this workspace uses for its own status columns.
//! Nothing in this crate talks to a database or a broker; it is the vocabulary other
//! crates share so they don't redeclare the same strings independently.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(anyhow::anyhow!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLossMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLoss => "SL",
            OrderType::StopLossMarket => "SL_M",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "SL" => Ok(OrderType::StopLoss),
            "SL_M" => Ok(OrderType::StopLossMarket),
            other => Err(anyhow::anyhow!("unknown order type: {other}")),
        }
    }
}

/// `Intraday` is an alias accepted on write and normalized to `Mis` — the source system's
/// order placement path passed the literal string `"INTRADAY"` while its own enum only
/// declared MIS/NRML. See DESIGN.md for the normalization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Mis,
    Nrml,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Mis => "MIS",
            ProductType::Nrml => "NRML",
        }
    }

    /// Accepts the historical `INTRADAY` alias in addition to `MIS`/`NRML`.
    pub fn parse_lenient(s: &str) -> anyhow::Result<Self> {
        match s {
            "MIS" | "INTRADAY" => Ok(ProductType::Mis),
            "NRML" => Ok(ProductType::Nrml),
            other => Err(anyhow::anyhow!("unknown product type: {other}")),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    RiskChecking,
    RiskApproved,
    RiskRejected,
    Sending,
    Acknowledged,
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::RiskChecking => "RISK_CHECKING",
            OrderStatus::RiskApproved => "RISK_APPROVED",
            OrderStatus::RiskRejected => "RISK_REJECTED",
            OrderStatus::Sending => "SENDING",
            OrderStatus::Acknowledged => "ACKNOWLEDGED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
                | OrderStatus::RiskRejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATED" => OrderStatus::Created,
            "RISK_CHECKING" => OrderStatus::RiskChecking,
            "RISK_APPROVED" => OrderStatus::RiskApproved,
            "RISK_REJECTED" => OrderStatus::RiskRejected,
            "SENDING" => OrderStatus::Sending,
            "ACKNOWLEDGED" => OrderStatus::Acknowledged,
            "PENDING" => OrderStatus::Pending,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            other => return Err(anyhow::anyhow!("unknown order status: {other}")),
        })
    }
}

/// One entry in an order's append-only `status_history` JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillReason {
    Manual,
    DailyLossBreach,
    MarginBreach,
    SystemError,
    ReconcileFail,
}

impl KillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillReason::Manual => "MANUAL",
            KillReason::DailyLossBreach => "DAILY_LOSS_BREACH",
            KillReason::MarginBreach => "MARGIN_BREACH",
            KillReason::SystemError => "SYSTEM_ERROR",
            KillReason::ReconcileFail => "RECONCILE_FAIL",
        }
    }
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunReconcileStatus {
    Pending,
    Ok,
    Mismatch,
    Failed,
}

impl RunReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunReconcileStatus::Pending => "PENDING",
            RunReconcileStatus::Ok => "OK",
            RunReconcileStatus::Mismatch => "MISMATCH",
            RunReconcileStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunReconcileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionReconcileStatus {
    Pending,
    Ok,
    Mismatch,
    Corrected,
}

impl PositionReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionReconcileStatus::Pending => "PENDING",
            PositionReconcileStatus::Ok => "OK",
            PositionReconcileStatus::Mismatch => "MISMATCH",
            PositionReconcileStatus::Corrected => "CORRECTED",
        }
    }
}

impl fmt::Display for PositionReconcileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Error,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Stopped => "stopped",
            StrategyStatus::Starting => "starting",
            StrategyStatus::Running => "running",
            StrategyStatus::Paused => "paused",
            StrategyStatus::Stopping => "stopping",
            StrategyStatus::Error => "error",
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "stopped" => StrategyStatus::Stopped,
            "starting" => StrategyStatus::Starting,
            "running" => StrategyStatus::Running,
            "paused" => StrategyStatus::Paused,
            "stopping" => StrategyStatus::Stopping,
            "error" => StrategyStatus::Error,
            other => return Err(anyhow::anyhow!("unknown strategy status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlIntent {
    Pause,
    Resume,
    Stop,
    Start,
}

impl ControlIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlIntent::Pause => "pause",
            ControlIntent::Resume => "resume",
            ControlIntent::Stop => "stop",
            ControlIntent::Start => "start",
        }
    }

    /// The strategy status this intent, once applied, leaves the row in.
    pub fn resulting_status(&self) -> StrategyStatus {
        match self {
            ControlIntent::Pause => StrategyStatus::Paused,
            ControlIntent::Resume => StrategyStatus::Running,
            ControlIntent::Stop => StrategyStatus::Stopped,
            ControlIntent::Start => StrategyStatus::Running,
        }
    }
}

impl fmt::Display for ControlIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlIntent {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pause" => ControlIntent::Pause,
            "resume" => ControlIntent::Resume,
            "stop" => ControlIntent::Stop,
            "start" => ControlIntent::Start,
            other => return Err(anyhow::anyhow!("unknown control intent: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionBias {
    Bull,
    Bear,
    Neutral,
}

impl DirectionBias {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectionBias::Bull => "BULL",
            DirectionBias::Bear => "BEAR",
            DirectionBias::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for DirectionBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy's emitted trading signal. `EXIT_LONG`/`EXIT_SHORT` carry the side they close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    Flat,
    Waiting,
    Buy,
    Sell,
    ExitLong,
    ExitShort,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Flat => "FLAT",
            Signal::Waiting => "WAITING",
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::ExitLong => "EXIT_LONG",
            Signal::ExitShort => "EXIT_SHORT",
        }
    }

    /// Signals that should cause the executor to attempt to place an order.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Signal::Buy | Signal::Sell | Signal::ExitLong | Signal::ExitShort
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "LONG" => Signal::Long,
            "SHORT" => Signal::Short,
            "FLAT" => Signal::Flat,
            "WAITING" => Signal::Waiting,
            "BUY" => Signal::Buy,
            "SELL" => Signal::Sell,
            "EXIT_LONG" => Signal::ExitLong,
            "EXIT_SHORT" => Signal::ExitShort,
            other => return Err(anyhow::anyhow!("unknown signal: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitState {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CLOSED" => CircuitState::Closed,
            "OPEN" => CircuitState::Open,
            "HALF_OPEN" => CircuitState::HalfOpen,
            other => return Err(anyhow::anyhow!("unknown circuit state: {other}")),
        })
    }
}

/// Status a broker reports for an order it holds, as distinct from our own `OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderStatus {
    Cancelled,
    Filled,
    Transit,
    Rejected,
    Pending,
}

impl BrokerOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerOrderStatus::Cancelled => "CANCELLED",
            BrokerOrderStatus::Filled => "FILLED",
            BrokerOrderStatus::Transit => "TRANSIT",
            BrokerOrderStatus::Rejected => "REJECTED",
            BrokerOrderStatus::Pending => "PENDING",
        }
    }

    /// Maps a broker-reported status onto our own order status vocabulary.
    pub fn to_order_status(self) -> OrderStatus {
        match self {
            BrokerOrderStatus::Cancelled => OrderStatus::Cancelled,
            BrokerOrderStatus::Filled => OrderStatus::Filled,
            BrokerOrderStatus::Transit => OrderStatus::Acknowledged,
            BrokerOrderStatus::Rejected => OrderStatus::Rejected,
            BrokerOrderStatus::Pending => OrderStatus::Pending,
        }
    }
}

/// A single market-data update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub ltp: f64,
    pub ts: DateTime<Utc>,
    pub vol: Option<i64>,
    pub oi: Option<i64>,
}

/// Stable, namespaced error codes forming the API contract of §7's error taxonomy.
/// Every fallible operation in the control plane that a caller branches on returns one
/// of these rather than a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    DuplicateOrder,
    LotSizeExceeded,
    InsufficientMargin,
    MaxPositionsReached,
    InvalidIntent,
    InvalidTransition,
    ConfirmRequired,
    MarginLimitBreach,
    DailyLossBreach,
    KillSwitchActive,
    LockTimeout,
    IntentRace,
    IntentPending,
    CircuitOpenOrders,
    CircuitOpenQuotes,
    CircuitOpenFunds,
    CircuitOpenWebsocket,
    MarginFetchFailed,
    BrokerReject,
    StoreUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateOrder => "DUPLICATE_ORDER",
            ErrorCode::LotSizeExceeded => "LOT_SIZE_EXCEEDED",
            ErrorCode::InsufficientMargin => "INSUFFICIENT_MARGIN",
            ErrorCode::MaxPositionsReached => "MAX_POSITIONS_REACHED",
            ErrorCode::InvalidIntent => "INVALID_INTENT",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::ConfirmRequired => "CONFIRM_REQUIRED",
            ErrorCode::MarginLimitBreach => "MARGIN_LIMIT_BREACH",
            ErrorCode::DailyLossBreach => "DAILY_LOSS_BREACH",
            ErrorCode::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            ErrorCode::LockTimeout => "LOCK_TIMEOUT",
            ErrorCode::IntentRace => "INTENT_RACE",
            ErrorCode::IntentPending => "INTENT_PENDING",
            ErrorCode::CircuitOpenOrders => "CIRCUIT_OPEN_ORDERS",
            ErrorCode::CircuitOpenQuotes => "CIRCUIT_OPEN_QUOTES",
            ErrorCode::CircuitOpenFunds => "CIRCUIT_OPEN_FUNDS",
            ErrorCode::CircuitOpenWebsocket => "CIRCUIT_OPEN_WEBSOCKET",
            ErrorCode::MarginFetchFailed => "MARGIN_FETCH_FAILED",
            ErrorCode::BrokerReject => "BROKER_REJECT",
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips() {
        for s in [
            OrderStatus::Created,
            OrderStatus::Acknowledged,
            OrderStatus::Filled,
            OrderStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
    }

    #[test]
    fn product_type_accepts_intraday_alias() {
        assert_eq!(
            ProductType::parse_lenient("INTRADAY").unwrap(),
            ProductType::Mis
        );
    }

    #[test]
    fn terminal_statuses_are_exhaustive_with_spec() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::RiskRejected.is_terminal());
        assert!(!OrderStatus::Acknowledged.is_terminal());
    }
}

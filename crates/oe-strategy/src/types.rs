use std::collections::VecDeque;

use oe_schemas::{DirectionBias, Signal, Tick};

/// A strategy's identity: the name it's registered and controlled under, and the single
/// symbol it watches. One strategy, one symbol — a strategy that needs several legs
/// (e.g. a spread) composes them inside its own `on_tick`, not by subscribing this
/// registry to more than one symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategySpec {
    pub name: String,
    pub symbol: String,
    pub strategy_type: String,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, strategy_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            strategy_type: strategy_type.into(),
        }
    }
}

/// Bounded recent-tick window kept per symbol. Oldest ticks fall off once `max_len` is
/// reached — strategies see a fixed-size tail, never an unbounded backlog.
#[derive(Clone, Debug)]
pub struct TickWindow {
    max_len: usize,
    ticks: VecDeque<Tick>,
}

pub const TICK_WINDOW_LEN: usize = 500;

impl TickWindow {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            ticks: VecDeque::with_capacity(max_len),
        }
    }

    pub fn push(&mut self, tick: Tick) {
        if self.ticks.len() == self.max_len {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn latest(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Tick> {
        self.ticks.iter()
    }
}

impl Default for TickWindow {
    fn default() -> Self {
        Self::new(TICK_WINDOW_LEN)
    }
}

/// Context handed to a strategy on every tick for its symbol.
#[derive(Debug)]
pub struct TickContext<'a> {
    pub tick: &'a Tick,
    pub recent: &'a TickWindow,
    pub open_qty: i32,
    pub avg_entry: Option<f64>,
    pub direction_bias: DirectionBias,
}

/// A strategy reacts to ticks and optionally emits a trading signal. Pure: no IO, no
/// broker access, no DB. The registry around it performs everything outside this
/// boundary.
pub trait Strategy: Send + Sync {
    fn spec(&self) -> StrategySpec;
    fn on_tick(&mut self, ctx: &TickContext<'_>) -> Option<Signal>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyRegistered(String),
    UnknownStrategy(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyRegistered(name) => write!(f, "strategy '{name}' already registered"),
            RegistryError::UnknownStrategy(name) => write!(f, "unknown strategy '{name}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

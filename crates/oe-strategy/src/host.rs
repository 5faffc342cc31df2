use std::collections::HashMap;

use oe_schemas::{DirectionBias, Signal, StrategyStatus, Tick};

use crate::types::{RegistryError, Strategy, StrategySpec, TickContext, TickWindow};

struct Registered {
    strategy: Box<dyn Strategy>,
    spec: StrategySpec,
    status: StrategyStatus,
    open_qty: i32,
    avg_entry: Option<f64>,
    direction_bias: DirectionBias,
}

/// Holds every registered strategy and a bounded tick window per symbol, and routes
/// incoming ticks to whichever strategies subscribe to that symbol.
///
/// Registration is idempotent: re-registering the same name with the same spec is a
/// no-op (mirrors the executor picking a strategy back up after a restart without
/// double-subscribing it). Re-registering the same name with a *different* spec is
/// rejected — that's a configuration bug, not a restart.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Registered>,
    windows: HashMap<String, TickWindow>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) -> Result<(), RegistryError> {
        let spec = strategy.spec();
        if let Some(existing) = self.strategies.get(&spec.name) {
            if existing.spec == spec {
                return Ok(());
            }
            return Err(RegistryError::AlreadyRegistered(spec.name));
        }

        self.windows.entry(spec.symbol.clone()).or_default();
        self.strategies.insert(
            spec.name.clone(),
            Registered {
                strategy,
                spec,
                status: StrategyStatus::Stopped,
                open_qty: 0,
                avg_entry: None,
                direction_bias: DirectionBias::Neutral,
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        self.strategies
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))
    }

    pub fn set_position(&mut self, name: &str, open_qty: i32, avg_entry: Option<f64>) -> Result<(), RegistryError> {
        let entry = self
            .strategies
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))?;
        entry.open_qty = open_qty;
        entry.avg_entry = avg_entry;
        Ok(())
    }

    /// Syncs the in-memory status cache for one strategy from `oe_db::strategy_state`.
    /// Unknown names are ignored rather than erroring — the control loop walks every row
    /// in the table, some of which may not (yet, or ever) be registered in this process.
    pub fn set_status(&mut self, name: &str, status: StrategyStatus) {
        if let Some(entry) = self.strategies.get_mut(name) {
            entry.status = status;
        }
    }

    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(|s| s.as_str())
    }

    /// Routes a tick to every `running` strategy subscribed to `tick.symbol`, returning
    /// the signal (if any) each one emitted plus the names of any strategies that
    /// panicked while handling it. Strategies are evaluated in name order so results
    /// are deterministic across runs with the same registration set. A panicking
    /// strategy is caught and reported, not allowed to take the others down with it.
    /// A paused or stopped strategy still has its tick window updated (so it has a
    /// warm window the moment it resumes) but never reaches `on_tick`.
    pub fn dispatch_tick(&mut self, tick: Tick) -> (Vec<(String, Signal)>, Vec<String>) {
        let window = self.windows.entry(tick.symbol.clone()).or_default();
        window.push(tick.clone());
        let window_snapshot = window.clone();

        let mut names: Vec<String> = self
            .strategies
            .iter()
            .filter(|(_, r)| r.spec.symbol == tick.symbol && r.status == StrategyStatus::Running)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let mut out = Vec::new();
        let mut crashed = Vec::new();
        for name in names {
            let entry = self.strategies.get_mut(&name).expect("name came from this map");
            let ctx = TickContext {
                tick: &tick,
                recent: &window_snapshot,
                open_qty: entry.open_qty,
                avg_entry: entry.avg_entry,
                direction_bias: entry.direction_bias,
            };
            let strategy = &mut entry.strategy;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| strategy.on_tick(&ctx)));
            match result {
                Ok(Some(signal)) => out.push((name.clone(), signal)),
                Ok(None) => {}
                Err(_) => crashed.push(name.clone()),
            }
        }
        (out, crashed)
    }

    #[cfg(test)]
    fn window_len(&self, symbol: &str) -> usize {
        self.windows.get(symbol).map(|w| w.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct AlwaysBuy(StrategySpec);
    impl Strategy for AlwaysBuy {
        fn spec(&self) -> StrategySpec {
            self.0.clone()
        }
        fn on_tick(&mut self, _ctx: &TickContext<'_>) -> Option<Signal> {
            Some(Signal::Buy)
        }
    }

    fn tick(symbol: &str, ltp: f64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            ltp,
            ts: Utc::now(),
            vol: None,
            oi: None,
        }
    }

    #[test]
    fn dispatch_only_reaches_subscribed_symbol() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        registry.set_status("s1", StrategyStatus::Running);

        let (signals, crashed) = registry.dispatch_tick(tick("BANKNIFTY", 100.0));
        assert!(signals.is_empty());
        assert!(crashed.is_empty());

        let (signals, crashed) = registry.dispatch_tick(tick("NIFTY", 100.0));
        assert_eq!(signals, vec![("s1".to_string(), Signal::Buy)]);
        assert!(crashed.is_empty());
    }

    #[test]
    fn a_paused_strategy_is_not_dispatched_to() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        registry.set_status("s1", StrategyStatus::Paused);

        let (signals, crashed) = registry.dispatch_tick(tick("NIFTY", 100.0));
        assert!(signals.is_empty());
        assert!(crashed.is_empty());
    }

    struct AlwaysPanics(StrategySpec);
    impl Strategy for AlwaysPanics {
        fn spec(&self) -> StrategySpec {
            self.0.clone()
        }
        fn on_tick(&mut self, _ctx: &TickContext<'_>) -> Option<Signal> {
            panic!("boom")
        }
    }

    #[test]
    fn a_panicking_strategy_does_not_stop_the_others() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysPanics(StrategySpec::new("bad", "NIFTY", "demo"))))
            .unwrap();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("good", "NIFTY", "demo"))))
            .unwrap();
        registry.set_status("bad", StrategyStatus::Running);
        registry.set_status("good", StrategyStatus::Running);

        let (signals, crashed) = registry.dispatch_tick(tick("NIFTY", 100.0));
        assert_eq!(signals, vec![("good".to_string(), Signal::Buy)]);
        assert_eq!(crashed, vec!["bad".to_string()]);
    }

    #[test]
    fn reregistering_same_spec_is_a_no_op() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        assert_eq!(registry.registered_names().count(), 1);
    }

    #[test]
    fn reregistering_conflicting_spec_errors() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        let err = registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "BANKNIFTY", "demo"))))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("s1".to_string()));
    }

    #[test]
    fn tick_window_truncates_to_bound() {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Box::new(AlwaysBuy(StrategySpec::new("s1", "NIFTY", "demo"))))
            .unwrap();
        for i in 0..600 {
            registry.dispatch_tick(tick("NIFTY", i as f64));
        }
        assert_eq!(registry.window_len("NIFTY"), 500);
    }
}

//! Bridges `oe_feed`'s tick fan-out to the strategy executor. Lives here, not in either
//! crate, since the dependency runs feed -> executor (the feed worker fans out to the
//! executor, the executor never reaches back into the feed worker) and this is the one
//! place both are already in scope.
use std::sync::Arc;

use async_trait::async_trait;
use oe_feed::TickHandler;
use oe_schemas::Tick;
use oe_strategy::StrategyRunner;

pub struct StrategyTickHandler(pub Arc<StrategyRunner>);

#[async_trait]
impl TickHandler for StrategyTickHandler {
    async fn handle_tick(&self, tick: &Tick) {
        if let Err(e) = self.0.on_tick(tick.clone()).await {
            tracing::error!(symbol = %tick.symbol, error = %e, "strategy runner failed to handle tick");
        }
    }
}

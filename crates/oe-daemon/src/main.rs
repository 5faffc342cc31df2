//! oe-daemon entry point.
//!
//! Thin by design: load config, connect to Postgres, run migrations, ensure today's
//! trading session, wire up the paper broker and background workers (feed heartbeat
//! monitor, reconciliation loop), then serve the health/status surface. Route handlers
//! live in `routes.rs`; shared state lives in `state.rs`.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use oe_broker::{types::FundsSnapshot, PaperBroker};
use oe_daemon::{routes, state, tick_bridge::StrategyTickHandler};
use oe_feed::{FeedWorker, NoopCache};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = oe_config::EngineConfig::from_env().context("load config failed")?;

    let pool = oe_db::connect(&config.database_url).await.context("db connect failed")?;
    oe_db::migrate(&pool).await.context("db migrate failed")?;

    let today = chrono::Utc::now().date_naive().to_string();
    let session = oe_db::sessions::ensure_session(&pool, &today)
        .await
        .context("ensure trading session failed")?;

    let broker: Arc<dyn oe_broker::BrokerAdapter> = Arc::new(PaperBroker::new(FundsSnapshot {
        available_margin: starting_margin_from_env(),
        used_margin: 0.0,
    }));

    spawn_feed_monitor(pool.clone());
    spawn_reconciliation_worker(pool.clone(), Arc::clone(&broker), session.id);

    let strategy_runner = Arc::new(oe_strategy::StrategyRunner::new(pool.clone(), Arc::clone(&broker), session.id));
    spawn_control_loop(Arc::clone(&strategy_runner));

    let feed = spawn_feed_worker(pool.clone(), Arc::clone(&broker), strategy_runner, subscribe_symbols_from_env());

    let shared = Arc::new(state::AppState::new(pool, broker, session.id, feed));

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!(%addr, session_id = %session.id, "oe-daemon listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("OE_DAEMON_ADDR").ok()?.parse().ok()
}

fn starting_margin_from_env() -> f64 {
    std::env::var("OE_PAPER_STARTING_MARGIN")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000_000.0)
}

fn spawn_feed_monitor(pool: sqlx::PgPool) {
    tokio::spawn(async move {
        let monitor = oe_feed::FeedMonitor::new(pool, "broker_ws");
        monitor.run_forever(Duration::from_secs(1)).await;
    });
}

fn spawn_reconciliation_worker(pool: sqlx::PgPool, broker: Arc<dyn oe_broker::BrokerAdapter>, session_id: uuid::Uuid) {
    tokio::spawn(async move {
        oe_reconcile::run_forever(&pool, broker.as_ref(), session_id).await;
    });
}

fn spawn_control_loop(strategy_runner: Arc<oe_strategy::StrategyRunner>) {
    tokio::spawn(async move {
        strategy_runner.run_control_loop().await;
    });
}

/// Builds the feed worker, wires the strategy runner in as its tick handler, and spawns
/// its subscription loop. Returns the worker so `/v1/status` can report its health.
fn spawn_feed_worker(
    pool: sqlx::PgPool,
    broker: Arc<dyn oe_broker::BrokerAdapter>,
    strategy_runner: Arc<oe_strategy::StrategyRunner>,
    symbols: Vec<String>,
) -> Arc<FeedWorker<NoopCache>> {
    let mut worker = FeedWorker::new(pool, broker, "broker_ws", NoopCache);
    worker.add_handler(Arc::new(StrategyTickHandler(strategy_runner)));

    let worker = Arc::new(worker);
    let task_handle = Arc::clone(&worker);
    tokio::spawn(async move {
        task_handle.run_forever(symbols).await;
    });

    worker
}

/// Symbols the feed worker subscribes to at startup. No automatic symbol discovery
/// exists yet (option-chain resolution is out of scope), so this is operator-supplied.
fn subscribe_symbols_from_env() -> Vec<String> {
    std::env::var("OE_FEED_SYMBOLS")
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

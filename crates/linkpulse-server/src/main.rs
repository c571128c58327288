use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use linkpulse_server::{
    aggregator, app,
    chain::HttpChainAdapter,
    enrich::Enricher,
    realtime, scheduler,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging; level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkpulse=info".parse()?),
        )
        .json()
        .init();

    let cfg = linkpulse_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/linkpulse.db", cfg.data_dir);
    let db = linkpulse_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    // Missing GeoIP database is non-fatal; the enricher logs it and events
    // carry empty geo fields.
    let enricher = Enricher::new(&cfg.geoip_path);
    let chain = Arc::new(HttpChainAdapter::new(&cfg.chain_url));

    let state = Arc::new(AppState::new(db, cfg.clone(), enricher, chain));

    // Long-lived background workers: realtime push + heartbeat, the nightly
    // rollup run, and the retention family.
    tokio::spawn(realtime::run_push_loop(Arc::clone(&state)));
    tokio::spawn(realtime::run_heartbeat_loop(Arc::clone(&state)));
    tokio::spawn(aggregator::run_aggregator_loop(Arc::clone(&state)));
    tokio::spawn(scheduler::run_retention_loop(Arc::clone(&state)));
    tokio::spawn(scheduler::run_orphan_close_loop(Arc::clone(&state)));
    tokio::spawn(scheduler::run_cache_sweep_loop(Arc::clone(&state)));
    tokio::spawn(scheduler::run_checkpoint_loop(Arc::clone(&state)));

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let app = app::build_app(Arc::clone(&state));

    info!(addr, "linkpulse listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

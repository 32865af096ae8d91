//! Pagewatch -- scheduled web-page analysis.
//!
//! This crate provides the core library for cron-driven page analysis
//! tasks: robots.txt consent checks, content fetching and extraction,
//! LLM summarization, and an append-only execution result log.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod robots;
pub mod storage;
pub mod summarize;
pub mod tasks;

use anyhow::Result;

use crate::config::PagewatchConfig;

/// Start the pagewatch daemon: API server plus the task scheduler.
pub async fn serve(cfg: PagewatchConfig) -> Result<()> {
    // 1. Initialize storage
    tracing::info!(db_path = %cfg.storage.db_path, "Initializing database");
    let pool = storage::open_pool(&cfg.storage.db_path)?;

    // 2. Initialize the registry and reinstall triggers for persisted
    //    active tasks, so schedules survive a restart.
    let registry = tasks::TaskRegistry::from_config(pool.clone(), &cfg);
    let installed = registry.rehydrate()?;
    tracing::info!(installed, "task triggers installed");

    // 3. Start API server
    let addr: std::net::SocketAddr = cfg.server.bind.parse()?;
    let app = api::router(api::state::AppState {
        pool,
        registry,
    });

    tracing::info!(%addr, "pagewatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! recordbase HTTP server.
//!
//! Startup order: configuration, logging, database migrations, upload
//! directory, then the listener.

use anyhow::{Context, Result};
use clap::Parser;
use recordbase_api::config::Config;
use recordbase_api::{build_router, AppState};
use recordbase_core::{init_logging_with, open_db, LocalFileStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;

    let log_dir = Config::absolute(&cwd, &config.log_dir);
    init_logging_with(config.log_level(), &log_dir.to_string_lossy(), true)
        .context("failed to initialize logging")?;

    let db_path = Config::absolute(&cwd, &config.db_path);
    let conn = open_db(&db_path)
        .with_context(|| format!("failed to open database `{}`", db_path.display()))?;

    let upload_dir = Config::absolute(&cwd, &config.upload_dir);
    std::fs::create_dir_all(&upload_dir).with_context(|| {
        format!("failed to create upload directory `{}`", upload_dir.display())
    })?;

    let state = AppState::new(conn, LocalFileStore::new(upload_dir), config.permission_ttl())
        .context("failed to register notification sinks")?;

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind `{}`", config.bind))?;
    log::info!(
        "event=server_start module=api status=ok bind={} db_path={} permission_ttl_secs={}",
        config.bind,
        db_path.display(),
        config.permission_cache_ttl_secs
    );

    axum::serve(listener, build_router(state))
        .await
        .context("server terminated")?;
    Ok(())
}

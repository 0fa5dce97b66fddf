use anyhow::{Context, Result};
use memorybook_core::{Annotator, Config, HistoryDir};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod engine;
mod pages;
mod routes;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("memorybookd starting");

    let config = Config::from_env();
    tracing::info!(
        book = %config.book_path.display(),
        history = %config.history_dir.display(),
        models = %config.model_dir.display(),
        "configuration loaded"
    );

    let engine = engine::spawn_engine(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
        config.match_policy(),
    )
    .context("failed to start face engine")?;

    let history = HistoryDir::open(&config.history_dir)?;
    let annotator = Annotator::new(Some(config.font_path.as_path()));

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(routes::AppState::new(config, engine, history, annotator));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "memorybookd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("memorybookd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

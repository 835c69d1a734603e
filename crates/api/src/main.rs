use std::sync::Arc;

use anyhow::Context;

use careledger_api::{app, config::ApiConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    careledger_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let (services, jobs) = app::services::build_services(&config).await?;
    let router = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let stats = jobs.shutdown().await?;
    tracing::info!(
        processed = stats.jobs_processed,
        dead_lettered = stats.jobs_dead_lettered,
        "job runner drained"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

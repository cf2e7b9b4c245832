mod bootstrap;
mod health;
mod maintenance;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use famcal_core::config::{AppConfig, LoadOptions};
use famcal_db::RetentionPolicy;
use famcal_messenger::whatsapp::{self, MessageWorker};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Ingress;

fn init_logging(config: &AppConfig) {
    use famcal_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let transport = app.ingress.transport();

    let cleanup = maintenance::spawn_periodic_cleanup(
        app.conversations.clone(),
        app.processed.clone(),
        RetentionPolicy::from_config(&app.config.conversation),
        Duration::from_secs(app.config.conversation.cleanup_interval_secs),
    );

    let mut http = health::router(app.db_pool.clone(), transport);
    let ingress: JoinHandle<()> = match app.ingress {
        Ingress::Signal(listener) => tokio::spawn(async move { listener.run().await }),
        Ingress::WhatsApp { webhook, queue } => {
            http = http.merge(whatsapp::router(webhook));
            let worker = MessageWorker::new(
                queue,
                Arc::clone(&app.service),
                app.config.signal.max_concurrent,
            );
            tokio::spawn(worker.run())
        }
    };

    health::spawn(&app.config.server.bind_address, app.config.server.health_check_port, http)
        .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport,
        "famcal-server started"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = wait_for_ingress(ingress) => {}
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "famcal-server stopping"
    );
    cleanup.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

/// Returns only if the ingress task ends; afterwards the process keeps serving until ctrl-c.
async fn wait_for_ingress(ingress: JoinHandle<()>) {
    if let Err(error) = ingress.await {
        tracing::error!(
            event_name = "system.ingress.aborted",
            correlation_id = "ingress",
            error = %error,
            "ingress task aborted"
        );
    }
    tracing::warn!(
        event_name = "system.ingress.stopped",
        correlation_id = "ingress",
        "ingress stopped; waiting for shutdown signal"
    );
    std::future::pending::<()>().await;
}

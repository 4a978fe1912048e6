use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dd_api::build_router;
use dd_api::state::ApiState;
use dd_cache::{Coordinator, CoordinatorHandle, RefreshSettings, Sources};
use dd_common::config::{EnvConfig, UpstreamCredentials};
use dd_resolver::parse_bookmarks;
use dd_upstream::{PrimaryClient, ProxyHostSource, ProxyManagerClient, UpstreamError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "dockdash=info,dd_cache=info,dd_upstream=info";

#[tokio::main]
async fn main() -> Result<()> {
    let config = EnvConfig::from_env();
    init_tracing(config.as_ref().is_ok_and(|c| c.log_json));
    let config = config.context("Invalid configuration")?;

    info!("dockdash starting...");
    info!(
        "Container API {} (timeout {}s), refresh debounce {}s",
        config.upstream.url,
        config.upstream_timeout.as_secs(),
        config.refresh_debounce.as_secs()
    );

    let primary = PrimaryClient::from_credentials(&config.upstream, config.upstream_timeout)
        .context("Failed to build container API client")?;

    let proxy_hosts: Option<Arc<dyn ProxyHostSource>> = match &config.proxy {
        None => {
            info!("Proxy manager not configured, URLs will use published ports");
            None
        }
        Some(creds) => match connect_proxy_manager(creds, config.upstream_timeout).await {
            Ok(client) => {
                info!("Proxy manager connected at {}", creds.url);
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!("Proxy manager unavailable, continuing without it: {e}");
                None
            }
        },
    };

    let bookmarks = config
        .bookmarks
        .as_deref()
        .map(parse_bookmarks)
        .unwrap_or_default();
    info!("Loaded {} bookmarks", bookmarks.len());

    let sources = Sources {
        containers: Arc::new(primary),
        proxy_hosts,
    };
    let coordinator = Coordinator::spawn(
        sources,
        bookmarks,
        RefreshSettings {
            debounce: config.refresh_debounce,
        },
    );

    spawn_event_logger(&coordinator);

    // Initial load in the background so the API is up immediately.
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if coordinator.refresh_immediate().await {
                info!("Initial refresh finished");
            } else {
                debug!("Initial refresh skipped, a cycle was already running");
            }
        });
    }

    if let Some(interval) = config.refresh_interval {
        spawn_periodic_refresh(coordinator.clone(), interval);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Dashboard API listening on {addr}");

    axum::serve(listener, build_router(ApiState::new(coordinator)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("dockdash stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_proxy_manager(
    creds: &UpstreamCredentials,
    timeout: Duration,
) -> Result<ProxyManagerClient, UpstreamError> {
    let client = ProxyManagerClient::from_credentials(creds, timeout)?;
    client.test_connection().await?;
    Ok(client)
}

fn spawn_event_logger(coordinator: &CoordinatorHandle) {
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(
                    cycle = event.cycle,
                    environments = event.environments,
                    entries = event.entries,
                    error = event.error.as_deref().unwrap_or(""),
                    "Snapshot published"
                ),
                Err(RecvError::Lagged(missed)) => debug!("Event logger lagged, {missed} events missed"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Goes through the debounce like any webhook.
fn spawn_periodic_refresh(coordinator: CoordinatorHandle, interval: Duration) {
    info!("Periodic refresh every {}s", interval.as_secs());
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            coordinator.request_refresh();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

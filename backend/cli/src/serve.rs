//! `voicetally serve`: gateway client, presence processor and HTTP API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use voicetally_config::VoiceTallyConfig;
use voicetally_core::{ChannelRegistry, PresenceBus, SessionStore};
use voicetally_discord::DiscordAdapter;
use voicetally_logging::redact_sensitive_data;
use voicetally_reports::{Locale, Messages, PngBarChart, ReportService, RetryPolicy};
use voicetally_store::{InMemoryStore, SqliteStore};
use voicetally_tracker::{AggregationEngine, PresenceProcessor};

use crate::api::{self, AppState};

pub async fn run_server(config: VoiceTallyConfig, in_memory: bool) -> Result<()> {
    let token = config
        .discord
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .context("No Discord bot token configured; set DISCORD_BOT_TOKEN or discord.token")?;

    if in_memory {
        warn!("Using in-memory store; voice time is lost on exit");
        run_with_store(config, token, Arc::new(InMemoryStore::new())).await
    } else {
        let store = SqliteStore::open(&config.storage.db_path)
            .with_context(|| format!("Failed to open database: {}", config.storage.db_path))?;
        run_with_store(config, token, Arc::new(store)).await
    }
}

async fn run_with_store<S>(config: VoiceTallyConfig, token: String, store: Arc<S>) -> Result<()>
where
    S: SessionStore + ChannelRegistry + 'static,
{
    info!(
        db = %config.storage.db_path,
        http = config.http.enabled,
        port = config.http.port,
        locale = %config.reports.locale,
        "Starting voicetally"
    );

    match store.open_sessions(None).await {
        Ok(open) if !open.is_empty() => {
            info!(count = open.len(), "Open sessions carried over from a previous run")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not list open sessions"),
    }

    let result = serve_until_shutdown(&config, token, Arc::clone(&store)).await;

    if let Err(e) = store.close().await {
        error!(error = %e, "Failed to close store");
    } else {
        info!("Store closed");
    }
    result
}

async fn serve_until_shutdown<S>(
    config: &VoiceTallyConfig,
    token: String,
    store: Arc<S>,
) -> Result<()>
where
    S: SessionStore + ChannelRegistry + 'static,
{
    let locale: Locale = config
        .reports
        .locale
        .parse()
        .map_err(anyhow::Error::msg)?;
    let query_timeout = Duration::from_millis(config.reports.query_timeout_ms);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received; shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            let _ = shutdown_tx.send(true);
        }
    });

    // Presence bus -> processor.
    let mut bus = PresenceBus::new();
    let presence_rx = bus
        .take_receiver()
        .context("presence receiver already taken")?;
    let processor = PresenceProcessor::new(Arc::clone(&store));
    let processor_task = tokio::spawn(async move { processor.run(presence_rx).await });

    // HTTP API.
    let http_task = if config.http.enabled {
        let state = Arc::new(AppState {
            engine: AggregationEngine::new(Arc::clone(&store)).with_timeout(query_timeout),
            default_limit: config.reports.limit,
        });
        let app = api::build_router(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());
        let addr = format!("{}:{}", config.http.bind_address, config.http.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
        info!(addr = %addr, "HTTP API listening");

        let mut rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "HTTP server failed");
            }
        }))
    } else {
        None
    };

    // Discord gateway.
    let chart = PngBarChart::discover(config.reports.font_path.as_deref().map(Path::new));
    let reports = Arc::new(
        ReportService::new(
            Arc::clone(&store),
            Arc::new(chart),
            Messages::new(locale),
        )
        .with_limit(config.reports.limit)
        .with_query_timeout(query_timeout),
    );
    let retry = RetryPolicy {
        max_attempts: config.retry.max_attempts,
        base_delay_ms: config.retry.base_delay_ms,
        max_delay_ms: config.retry.max_delay_ms,
    };
    let adapter = DiscordAdapter::new(token, bus.sender(), reports, retry)
        .with_application_id(config.discord.application_id);
    // The adapter holds the only remaining sender once the bus is gone.
    drop(bus);

    let mut rx = shutdown_rx.clone();
    let adapter_result = adapter
        .run(async move {
            let _ = rx.wait_for(|stop| *stop).await;
        })
        .await;
    if let Err(e) = &adapter_result {
        error!(error = %redact_sensitive_data(&format!("{e:#}")), "Discord adapter failed");
    }

    // Stop everything else, then let the processor drain queued events.
    let _ = shutdown_tx.send(true);
    if let Some(task) = http_task {
        if let Err(e) = task.await {
            error!(error = %e, "HTTP task panicked");
        }
    }
    if let Err(e) = processor_task.await {
        error!(error = %e, "Presence processor panicked");
    }
    info!("Presence events drained");

    adapter_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetally_config::{is_supported_locale, LOCALE_TAGS};

    #[test]
    fn every_accepted_locale_tag_parses() {
        for tag in LOCALE_TAGS {
            assert!(tag.parse::<Locale>().is_ok(), "{tag}");
            assert!(tag.to_ascii_uppercase().parse::<Locale>().is_ok(), "{tag}");
        }
        assert!(!is_supported_locale("fr"));
        assert!("fr".parse::<Locale>().is_err());
    }
}

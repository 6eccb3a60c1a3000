// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

mod api;
mod cache;
mod category;
mod config;
mod demo;
mod error;
mod metrics;
mod model;
mod normalize;
mod upstream;
mod view;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api::{AppState, Settings};
use cache::Cache;
use config::{AppConfig, LogFormat};
use metrics::Metrics;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use upstream::GraphClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_format);

    if !cfg.credentials.has_access_token() {
        tracing::warn!("no Meta access token configured; data routes will answer 500");
    }
    if cfg.demo_mode && !cfg.credentials.is_campaign_ready() {
        tracing::warn!("demo mode enabled; campaign routes serve demonstration data");
    }

    let cache = Cache::in_memory(cfg.campaign_ttl);
    let metrics = Metrics::new().context("failed to register metrics")?;
    let upstream =
        GraphClient::try_new(cfg.upstream.clone()).context("failed to build Graph API client")?;

    let state = AppState {
        cache: cache.clone(),
        metrics: metrics.clone(),
        upstream: Arc::new(upstream),
        credentials: cfg.credentials.clone(),
        settings: Settings::from_config(&cfg),
    };

    spawn_janitor(cache, metrics, cfg.janitor_interval());

    let mut app = api::router(state);
    if let Some(dir) = &cfg.static_dir {
        tracing::info!(dir = %dir.display(), "serving static assets");
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listen_addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    tracing::info!(%listen_addr, "starting adlens");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("adlens exited cleanly");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn spawn_janitor(cache: Cache, metrics: Metrics, interval: Duration) {
    if interval.is_zero() {
        tracing::warn!("janitor interval disabled; expired entries will linger");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match cache.purge_expired().await {
                Ok(purged) => {
                    if purged > 0 {
                        metrics.record_cache_expired(purged);
                        tracing::debug!(purged, "purged expired cache entries");
                    }
                }
                Err(error) => tracing::warn!(%error, "cache sweep failed"),
            }
            if let Ok(stats) = cache.stats().await {
                metrics.update_cache_keys(stats.keys);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => term_signal.recv().await,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                None
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

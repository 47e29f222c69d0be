//! OpenSASE POS - Self-hosted point of sale and inventory service

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_pos::api::{self, AppState};
use opensase_pos::backend::{Backend, MemoryBackend, RestBackend};
use opensase_pos::config::{BackendConfig, Config};
use opensase_pos::domain::session::Role;
use opensase_pos::publisher::EventPublisher;
use opensase_pos::realtime::{phoenix::PhoenixFeed, ChangeFeed};
use opensase_pos::services::{Context, Services};
use opensase_pos::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;
    let store = Arc::new(Store::new());

    let (backend, feed): (Arc<dyn Backend>, Option<Arc<dyn ChangeFeed>>) = match &config.backend {
        BackendConfig::Rest { url, anon_key } => {
            let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(url.as_str(), anon_key.as_str(), config.storage_bucket.as_str()));
            let feed: Arc<dyn ChangeFeed> = Arc::new(PhoenixFeed::new(url, anon_key.as_str())?.with_session(store.clone()));
            (backend, Some(feed))
        }
        BackendConfig::Memory { demo_user } => {
            let mut memory = MemoryBackend::new().with_bucket(config.storage_bucket.as_str());
            if let Some((email, password)) = demo_user {
                memory = memory.with_user(email, password, Role::Admin);
            }
            tracing::warn!("Using the in-memory backend; nothing is persisted");
            let memory = Arc::new(memory);
            let backend: Arc<dyn Backend> = memory.clone();
            let feed: Arc<dyn ChangeFeed> = memory;
            (backend, Some(feed))
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    let ctx = Context::new(backend, store.clone(), EventPublisher::new(nats), config.tax_rate);
    let services = Arc::new(Services::new(ctx));

    let shutdown = CancellationToken::new();
    let watcher = feed.filter(|_| config.realtime).map(|feed| services.alerts.watch(feed, shutdown.child_token()));

    let app = api::router(AppState { services, store });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("🚀 OpenSASE POS listening on 0.0.0.0:{}", config.port);
    let cancel = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            cancel.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(watcher) = watcher {
        watcher.await.ok();
    }
    Ok(())
}

//! `homeguard` server entry point.
//!
//! Opens the configuration store, wires the notifier, mail template, and
//! event sinks, then starts the Axum HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use homeguard_core::events::{EventLog, FileEventSink};
use homeguard_core::mail::{MailTemplate, TextTemplate};
use homeguard_core::notifier::{Notifier, SpoolNotifier};
use homeguard_core::watched::WatchedName;
use homeguard_storage::{ConfigStore, ExpiringStore, MemoryConfigStore, MemoryExpiringStore};

use homeguard_server::config::{ConfigStoreType, NotifierType, ServerConfig};
use homeguard_server::routes;
use homeguard_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        store = ?config.config_store,
        link_base = ?config.protocol.link_base,
        admin_path = %config.protocol.admin_path,
        "homeguard starting"
    );

    let state = build_app_state(&config).await?;
    let app = routes::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "homeguard server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("homeguard server stopped");
    Ok(())
}

/// Build the shared application state.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let config_store: Arc<dyn ConfigStore> = match &config.config_store {
        ConfigStoreType::Memory => {
            info!("using in-memory configuration (data will not persist)");
            Arc::new(MemoryConfigStore::new())
        }
        #[cfg(feature = "redb-backend")]
        ConfigStoreType::Redb { path } => {
            info!(path = %path, "using redb configuration store");
            Arc::new(
                homeguard_storage::RedbConfigStore::open(path)
                    .context("failed to open redb configuration store")?,
            )
        }
        #[cfg(not(feature = "redb-backend"))]
        ConfigStoreType::Redb { .. } => {
            anyhow::bail!("redb store requested but feature 'redb-backend' is not enabled");
        }
    };

    if let Some(ref seed) = config.seed_home {
        seed_site_address(config_store.as_ref(), seed).await?;
    }

    let transient: Arc<dyn ExpiringStore> = Arc::new(MemoryExpiringStore::new());

    let notifier: Arc<dyn Notifier> = match &config.notifier {
        NotifierType::Spool { path } => {
            info!(path = %path, "spooling restore-link mail to file");
            Arc::new(SpoolNotifier::new(path))
        }
        #[cfg(feature = "webhook-notifier")]
        NotifierType::Webhook { url } => {
            info!("relaying restore-link mail over HTTP");
            Arc::new(
                homeguard_server::notifier::WebhookNotifier::new(url.as_str())
                    .context("failed to build mail relay client")?,
            )
        }
        #[cfg(not(feature = "webhook-notifier"))]
        NotifierType::Webhook { .. } => {
            anyhow::bail!("mail relay requested but feature 'webhook-notifier' is not enabled");
        }
    };

    let mut template = TextTemplate::default();
    if let Some(ref subject) = config.mail_subject {
        template = template.with_subject(subject.as_str());
    }
    if let Some(ref body) = config.mail_body {
        template = template.with_body(body.as_str());
    }
    let template: Arc<dyn MailTemplate> = Arc::new(template);

    let events = Arc::new(EventLog::new());
    if let Some(ref path) = config.event_log_path {
        events.add_sink(Arc::new(FileEventSink::new(path))).await;
        info!(path = %path, "restore event log enabled");
    }

    if config.api_token.is_none() {
        warn!("HOMEGUARD_API_TOKEN not set, options API is unauthenticated");
    }

    Ok(Arc::new(AppState {
        config_store,
        transient,
        notifier,
        template,
        events,
        protocol: config.protocol.clone(),
        api_token: config.api_token.clone(),
    }))
}

/// Give `home` and `siteurl` an initial value when the store has none.
/// Writes the store directly so no restore link is issued.
async fn seed_site_address(store: &dyn ConfigStore, seed: &str) -> anyhow::Result<()> {
    for watched in WatchedName::ALL {
        let name = watched.as_str();
        let current = store
            .get(name)
            .await
            .with_context(|| format!("failed to read '{name}'"))?;
        if current.is_none_or(|v| v.is_empty()) {
            store
                .set(name, seed)
                .await
                .with_context(|| format!("failed to seed '{name}'"))?;
            info!(option = name, value = %seed, "seeded site address");
        }
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}

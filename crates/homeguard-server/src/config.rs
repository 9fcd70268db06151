//! Server configuration for `homeguard`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `HOMEGUARD_*` environment variables.

use std::net::SocketAddr;

use homeguard_core::protocol::{DEFAULT_ADMIN_PATH, LinkBase, ProtocolConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Configuration store backend.
    pub config_store: ConfigStoreType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Restore protocol settings.
    pub protocol: ProtocolConfig,
    /// Mail subject override.
    pub mail_subject: Option<String>,
    /// Mail body override (must contain `{restore_url}` to carry the link).
    pub mail_body: Option<String>,
    /// Path of the JSON-lines event log (optional).
    pub event_log_path: Option<String>,
    /// How restore-link emails leave the process.
    pub notifier: NotifierType,
    /// Value for `home`/`siteurl` when the store has none.
    pub seed_home: Option<String>,
    /// Token required on the options API (`X-Homeguard-Token`). Unset means
    /// the API is open, which is only suitable for local development.
    pub api_token: Option<String>,
}

/// Supported configuration store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStoreType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// redb database file.
    Redb { path: String },
}

/// Supported outbound mail transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierType {
    /// Append messages to a JSON-lines spool file.
    Spool { path: String },
    /// POST messages as JSON to a mail relay.
    Webhook { url: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on, on `0.0.0.0`
    /// - `HOMEGUARD_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `HOMEGUARD_LOG_LEVEL` — log filter (default: `info`)
    /// - `HOMEGUARD_CONFIG_STORE` — `memory` or `redb` (default: `memory`)
    /// - `HOMEGUARD_CONFIG_PATH` — redb file path (default: `./homeguard.redb`)
    /// - `HOMEGUARD_ADMIN_EMAIL` — restore-link recipient (default: the `admin_email` option)
    /// - `HOMEGUARD_ADMIN_PATH` — admin area path (default: `/wp-admin`)
    /// - `HOMEGUARD_LINK_BASE` — `live-home` or `previous-home` (default: `live-home`)
    /// - `HOMEGUARD_MAIL_SUBJECT`, `HOMEGUARD_MAIL_BODY` — email text overrides
    /// - `HOMEGUARD_EVENT_LOG` — path to the JSON-lines event log (optional)
    /// - `HOMEGUARD_WEBHOOK_URL` — mail relay endpoint (default: spool file)
    /// - `HOMEGUARD_MAIL_SPOOL` — spool file path (default: `./homeguard-mail.jsonl`)
    /// - `HOMEGUARD_SEED_HOME` — initial `home`/`siteurl` for an empty store
    /// - `HOMEGUARD_API_TOKEN` — token required on the options API
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = if let Ok(addr) = std::env::var("HOMEGUARD_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8080);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8080))
        };

        let config_store = match std::env::var("HOMEGUARD_CONFIG_STORE")
            .unwrap_or_else(|_| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "redb" => ConfigStoreType::Redb {
                path: std::env::var("HOMEGUARD_CONFIG_PATH")
                    .unwrap_or_else(|_| "./homeguard.redb".to_owned()),
            },
            _ => ConfigStoreType::Memory,
        };

        let log_level = std::env::var("HOMEGUARD_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let admin_path = std::env::var("HOMEGUARD_ADMIN_PATH")
            .ok()
            .filter(|p| !p.trim_matches('/').is_empty())
            .map_or_else(|| DEFAULT_ADMIN_PATH.to_owned(), |p| normalize_path(&p));

        let link_base = std::env::var("HOMEGUARD_LINK_BASE")
            .ok()
            .and_then(|v| v.parse::<LinkBase>().ok())
            .unwrap_or_default();

        let protocol = ProtocolConfig {
            admin_path,
            link_base,
            recipient: non_empty_var("HOMEGUARD_ADMIN_EMAIL"),
        };

        let notifier = match non_empty_var("HOMEGUARD_WEBHOOK_URL") {
            Some(url) => NotifierType::Webhook { url },
            None => NotifierType::Spool {
                path: std::env::var("HOMEGUARD_MAIL_SPOOL")
                    .unwrap_or_else(|_| "./homeguard-mail.jsonl".to_owned()),
            },
        };

        Self {
            bind_addr,
            config_store,
            log_level,
            protocol,
            mail_subject: non_empty_var("HOMEGUARD_MAIL_SUBJECT"),
            mail_body: non_empty_var("HOMEGUARD_MAIL_BODY"),
            event_log_path: non_empty_var("HOMEGUARD_EVENT_LOG"),
            notifier,
            seed_home: non_empty_var("HOMEGUARD_SEED_HOME"),
            api_token: non_empty_var("HOMEGUARD_API_TOKEN"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// `wp-admin/` → `/wp-admin`
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

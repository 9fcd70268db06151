//! Shared application state for the `homeguard` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds only process-wide collaborators; the
//! restore protocol itself is instantiated per request by
//! [`AppState::begin_request`].

use std::sync::Arc;

use homeguard_core::events::EventLog;
use homeguard_core::mail::MailTemplate;
use homeguard_core::notifier::Notifier;
use homeguard_core::options::Options;
use homeguard_core::protocol::{ProtocolConfig, ProtocolDeps, RestoreProtocol};
use homeguard_storage::{ConfigStore, ExpiringStore};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Durable site configuration.
    pub config_store: Arc<dyn ConfigStore>,
    /// Transient restore state (key, backups, success flag).
    pub transient: Arc<dyn ExpiringStore>,
    /// Restore-link delivery.
    pub notifier: Arc<dyn Notifier>,
    /// Restore-link email text.
    pub template: Arc<dyn MailTemplate>,
    /// Audit event fan-out.
    pub events: Arc<EventLog>,
    /// Settings handed to every protocol instance.
    pub protocol: ProtocolConfig,
    /// Token required on the options API, if any.
    pub api_token: Option<String>,
}

/// Per-request handles, inserted into request extensions by the restore
/// middleware.
#[derive(Clone)]
pub struct RequestContext {
    /// Configuration access whose writes notify `protocol`.
    pub options: Arc<Options>,
    /// This request's protocol instance.
    pub protocol: Arc<RestoreProtocol>,
}

impl AppState {
    /// Build this request's `Options` and a protocol instance listening on
    /// it.
    pub async fn begin_request(&self) -> RequestContext {
        let options = Arc::new(Options::new(Arc::clone(&self.config_store)));
        let deps = ProtocolDeps {
            options: Arc::clone(&options),
            transient: Arc::clone(&self.transient),
            notifier: Arc::clone(&self.notifier),
            template: Arc::clone(&self.template),
            events: Arc::clone(&self.events),
        };
        let protocol = RestoreProtocol::attach(deps, self.protocol.clone()).await;
        RequestContext { options, protocol }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("protocol", &self.protocol)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

//! The restore protocol.
//!
//! Guards the site's identity settings (`home`, `siteurl`) against
//! lock-out. A change to either one:
//!
//! 1. backs up the prior value in the expiring store (`old_home`,
//!    `old_siteurl`, 30 minutes),
//! 2. makes sure a restore key is stored (`siteurl_restore_key`, 30 minutes),
//! 3. mails a link carrying the key to the administrator, once per instance.
//!
//! Presenting the key ([`RestoreProtocol::attempt_restore`]) writes the
//! backups back, consumes the key, and sets a short-lived success flag
//! (`siteurl_restore_success`, 5 minutes) that the next admin page load
//! turns into a one-time notice.
//!
//! # Instance state
//!
//! A [`RestoreProtocol`] lives for one request. Its memoized key, sent-flag,
//! and cached previous `home` are never shared; everything that must outlive
//! the request is in the expiring store.
//!
//! # Failure model
//!
//! Only an invalid key is fatal. Storage and delivery failures are logged
//! and the dependent step is skipped; partial state expires on its own or
//! is repaired by the next change.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use homeguard_storage::ExpiringStore;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::RestoreError;
use crate::events::{EventLog, RestoreEvent};
use crate::keygen::RestoreKeyGenerator;
use crate::mail::{self, MailTemplate, TextTemplate};
use crate::notice::{self, AdminNotices};
use crate::notifier::Notifier;
use crate::options::{OptionObserver, Options};
use crate::watched::WatchedName;

/// Expiring-store key of the restore key.
pub const RESTORE_KEY: &str = "siteurl_restore_key";

/// Expiring-store key of the success flag.
pub const SUCCESS_FLAG: &str = "siteurl_restore_success";

/// Value of a set success flag.
pub const SUCCESS_FLAG_VALUE: &str = "1";

/// Lifetime of the restore key.
pub const RESTORE_KEY_TTL: Duration = Duration::from_secs(1800);

/// Lifetime of each backup value.
pub const BACKUP_TTL: Duration = Duration::from_secs(1800);

/// Lifetime of the success flag.
pub const SUCCESS_FLAG_TTL: Duration = Duration::from_secs(300);

/// Query parameter carrying a presented restore key.
pub const RESTORE_KEY_PARAM: &str = "srk";

/// Query parameter marking the post-restore admin page load.
pub const SUCCESS_PARAM: &str = "srsuccess";

/// Configuration option holding the default notification recipient.
pub const ADMIN_EMAIL_OPTION: &str = "admin_email";

/// Default path of the admin area, appended to `home`.
pub const DEFAULT_ADMIN_PATH: &str = "/wp-admin";

/// Which address the restore link is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkBase {
    /// The `home` value as stored when the email is composed.
    #[default]
    LiveHome,
    /// The `home` value from before the change in this burst, falling back
    /// to the live value when `home` did not change.
    PreviousHome,
}

impl std::str::FromStr for LinkBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live-home" | "live" => Ok(Self::LiveHome),
            "previous-home" | "previous" => Ok(Self::PreviousHome),
            other => Err(format!("unknown link base '{other}'")),
        }
    }
}

/// Protocol settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Admin area path appended to `home` for the success redirect.
    pub admin_path: String,
    /// Address the restore link is built on.
    pub link_base: LinkBase,
    /// Recipient override. When `None`, the `admin_email` option is used.
    pub recipient: Option<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            admin_path: DEFAULT_ADMIN_PATH.to_owned(),
            link_base: LinkBase::default(),
            recipient: None,
        }
    }
}

/// Collaborators of a protocol instance.
pub struct ProtocolDeps {
    /// Request-scoped configuration access.
    pub options: Arc<Options>,
    /// Shared transient storage.
    pub transient: Arc<dyn ExpiringStore>,
    /// Restore-link delivery.
    pub notifier: Arc<dyn Notifier>,
    /// Restore-link email text.
    pub template: Arc<dyn MailTemplate>,
    /// Audit event fan-out.
    pub events: Arc<EventLog>,
}

impl ProtocolDeps {
    /// Dependencies with the default mail template and an empty event log.
    #[must_use]
    pub fn new(
        options: Arc<Options>,
        transient: Arc<dyn ExpiringStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            options,
            transient,
            notifier,
            template: Arc::new(TextTemplate::default()),
            events: Arc::new(EventLog::new()),
        }
    }
}

/// Result of a restore attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No key was presented, or nothing could be restored.
    Idle,
    /// At least one value was restored. The caller must redirect to
    /// `redirect_to` and stop processing the request.
    Applied {
        restored: Vec<WatchedName>,
        redirect_to: String,
    },
}

/// One request's instance of the restore protocol.
pub struct RestoreProtocol {
    options: Arc<Options>,
    transient: Arc<dyn ExpiringStore>,
    notifier: Arc<dyn Notifier>,
    template: Arc<dyn MailTemplate>,
    events: Arc<EventLog>,
    config: ProtocolConfig,
    keys: RestoreKeyGenerator,
    email_sent: AtomicBool,
    previous_home: RwLock<Option<String>>,
}

impl RestoreProtocol {
    /// Create an instance that is not yet listening for changes.
    #[must_use]
    pub fn new(deps: ProtocolDeps, config: ProtocolConfig) -> Self {
        Self {
            options: deps.options,
            transient: deps.transient,
            notifier: deps.notifier,
            template: deps.template,
            events: deps.events,
            config,
            keys: RestoreKeyGenerator::new(),
            email_sent: AtomicBool::new(false),
            previous_home: RwLock::new(None),
        }
    }

    /// Create an instance and subscribe it to its `Options`.
    ///
    /// The subscription is weak: it ends when the returned `Arc` is dropped.
    pub async fn attach(deps: ProtocolDeps, config: ProtocolConfig) -> Arc<Self> {
        let protocol = Arc::new(Self::new(deps, config));
        protocol.options.subscribe(&protocol).await;
        protocol
    }

    /// The configuration this instance runs with.
    #[must_use]
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Whether this instance has successfully sent its restore-link email.
    #[must_use]
    pub fn email_sent(&self) -> bool {
        self.email_sent.load(Ordering::Acquire)
    }

    // ── Change interception ──────────────────────────────────────────

    /// React to a configuration change.
    ///
    /// Ignores names other than `home`/`siteurl`, and writes whose new value
    /// equals the stored backup (that write is a restore in progress).
    pub async fn on_config_changed(&self, name: &str, old_value: &str, new_value: &str) {
        let Some(watched) = WatchedName::parse(name) else {
            return;
        };

        match self.transient.get(watched.backup_key()).await {
            Ok(Some(backup)) if backup == new_value => {
                debug!(option = %watched, "change matches backup, restore in progress");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(option = %watched, error = %e, "failed to read backup, treating as absent");
            }
        }

        if watched == WatchedName::Home {
            *self.previous_home.write().await = Some(old_value.to_owned());
        }

        let key_stored = self.ensure_key_stored().await;
        let backup_stored = self.store_backup(watched, old_value).await;

        if key_stored && backup_stored {
            self.send_restore_link_email().await;
        } else {
            warn!(
                option = %watched,
                key_stored,
                backup_stored,
                "restore state incomplete, not sending restore link"
            );
        }
    }

    /// Persist the instance's key unless the stored key already equals it.
    ///
    /// A valid stored key is adopted first, so a fresh instance reuses it
    /// rather than replacing it.
    async fn ensure_key_stored(&self) -> bool {
        let stored = match self.transient.get(RESTORE_KEY).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "failed to read restore key");
                None
            }
        };
        if let Some(ref stored) = stored {
            self.keys.adopt(stored);
        }

        let current = self.keys.current_key();
        if stored.as_deref() == Some(current) {
            return true;
        }

        match self
            .transient
            .set(RESTORE_KEY, current, RESTORE_KEY_TTL)
            .await
        {
            Ok(()) => {
                info!(ttl_secs = RESTORE_KEY_TTL.as_secs(), "restore key issued");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to store restore key");
                false
            }
        }
    }

    /// Replace the backup for `watched`. Delete-then-set so the TTL restarts.
    async fn store_backup(&self, watched: WatchedName, old_value: &str) -> bool {
        let key = watched.backup_key();
        if let Err(e) = self.transient.delete(key).await {
            warn!(option = %watched, error = %e, "failed to clear previous backup");
            return false;
        }
        match self.transient.set(key, old_value, BACKUP_TTL).await {
            Ok(()) => {
                info!(option = %watched, ttl_secs = BACKUP_TTL.as_secs(), "backup captured");
                true
            }
            Err(e) => {
                warn!(option = %watched, error = %e, "failed to store backup");
                false
            }
        }
    }

    // ── Notification ─────────────────────────────────────────────────

    /// Mail the restore link, at most once successfully per instance.
    ///
    /// Every dispatch attempt emits [`RestoreEvent::EmailAttempted`]; only an
    /// accepted message sets the sent-flag. Returns whether the email has
    /// been sent by this instance.
    pub async fn send_restore_link_email(&self) -> bool {
        if self.email_sent() {
            return true;
        }

        let Some(recipient) = self.recipient().await else {
            warn!("no recipient configured, restore link not sent");
            return false;
        };
        let Some(restore_url) = self.restore_url().await else {
            warn!("no home address available, restore link not sent");
            return false;
        };

        let message = mail::compose(self.template.as_ref(), &restore_url);
        let success = self
            .notifier
            .send(&recipient, &message.subject, &message.body)
            .await;

        self.events
            .emit(RestoreEvent::EmailAttempted { success })
            .await;

        if success {
            self.email_sent.store(true, Ordering::Release);
            info!("restore link sent");
        } else {
            warn!("restore link delivery failed");
        }
        success
    }

    async fn recipient(&self) -> Option<String> {
        if let Some(ref recipient) = self.config.recipient {
            return Some(recipient.clone());
        }
        match self.options.get(ADMIN_EMAIL_OPTION).await {
            Ok(recipient) => recipient.filter(|r| !r.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read admin email");
                None
            }
        }
    }

    /// The link base followed by `srk=<key>`.
    async fn restore_url(&self) -> Option<String> {
        let previous = match self.config.link_base {
            LinkBase::PreviousHome => self.previous_home.read().await.clone(),
            LinkBase::LiveHome => None,
        };
        let base = match previous {
            Some(previous) => previous,
            None => self.live_home().await?,
        };
        Some(add_query_arg(
            &base,
            RESTORE_KEY_PARAM,
            self.keys.current_key(),
        ))
    }

    async fn live_home(&self) -> Option<String> {
        match self.options.get(WatchedName::Home.as_str()).await {
            Ok(home) => home.filter(|h| !h.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read home");
                None
            }
        }
    }

    // ── Restore ──────────────────────────────────────────────────────

    /// Validate a presented key and, if it matches, restore the backups.
    ///
    /// An absent or empty key is a no-op. Each watched name with a backup is
    /// restored independently; if at least one succeeds the key is consumed,
    /// the success flag is set, and the outcome carries the redirect target.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::InvalidKey`] if the key does not match the stored
    ///   key or no key is stored. Nothing is modified.
    /// - [`RestoreError::Storage`] if the stored key cannot be read. Once a
    ///   restore is applied the call always succeeds; if `home` cannot be
    ///   read the redirect target is the relative admin path.
    pub async fn attempt_restore(
        &self,
        presented_key: Option<&str>,
    ) -> Result<RestoreOutcome, RestoreError> {
        let Some(presented) = presented_key.filter(|k| !k.is_empty()) else {
            return Ok(RestoreOutcome::Idle);
        };

        let stored = self.transient.get(RESTORE_KEY).await?;
        let valid = stored.is_some_and(|stored| {
            bool::from(stored.as_bytes().ct_eq(presented.as_bytes()))
        });
        if !valid {
            warn!("restore key rejected");
            self.events.emit(RestoreEvent::RestoreRejected).await;
            return Err(RestoreError::InvalidKey);
        }

        let mut restored = Vec::new();
        for watched in WatchedName::ALL {
            if self.restore_one(watched).await {
                restored.push(watched);
            }
        }

        if restored.is_empty() {
            info!("valid restore key presented but nothing was restored");
            return Ok(RestoreOutcome::Idle);
        }

        if let Err(e) = self.transient.delete(RESTORE_KEY).await {
            warn!(error = %e, "failed to consume restore key");
        }
        if let Err(e) = self
            .transient
            .set(SUCCESS_FLAG, SUCCESS_FLAG_VALUE, SUCCESS_FLAG_TTL)
            .await
        {
            warn!(error = %e, "failed to set restore success flag");
        }

        info!(restored = ?restored, "restore applied");
        self.events
            .emit(RestoreEvent::RestoreApplied {
                restored: restored.clone(),
            })
            .await;

        let redirect_to = match self.success_redirect().await {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    error = %e,
                    "failed to read home after restore, redirecting to relative admin path"
                );
                self.relative_success_redirect()
            }
        };
        Ok(RestoreOutcome::Applied {
            restored,
            redirect_to,
        })
    }

    /// Write one backup back. A value already equal to its backup counts as
    /// restored.
    async fn restore_one(&self, watched: WatchedName) -> bool {
        let key = watched.backup_key();
        let backup = match self.transient.get(key).await {
            Ok(Some(backup)) => backup,
            Ok(None) => return false,
            Err(e) => {
                warn!(option = %watched, error = %e, "failed to read backup");
                return false;
            }
        };

        if let Err(e) = self.options.update(watched.as_str(), &backup).await {
            warn!(option = %watched, error = %e, "failed to restore option");
            return false;
        }

        if let Err(e) = self.transient.delete(key).await {
            warn!(option = %watched, error = %e, "failed to delete used backup");
        }
        info!(option = %watched, "option restored");
        true
    }

    // ── Success signaling ────────────────────────────────────────────

    /// Redirect target after a restore: the live `home`, the admin path, and
    /// `srsuccess=1`.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError::Storage`] if `home` cannot be read.
    pub async fn success_redirect(&self) -> Result<String, RestoreError> {
        let home = self
            .options
            .get(WatchedName::Home.as_str())
            .await?
            .unwrap_or_default();
        let admin_path = self.config.admin_path.trim_start_matches('/');
        let admin_url = format!("{}/{admin_path}", home.trim_end_matches('/'));
        Ok(add_query_arg(&admin_url, SUCCESS_PARAM, SUCCESS_FLAG_VALUE))
    }

    /// `<admin_path>?srsuccess=1`, relative to whatever host served the
    /// request.
    fn relative_success_redirect(&self) -> String {
        let admin_path = format!("/{}", self.config.admin_path.trim_start_matches('/'));
        add_query_arg(&admin_path, SUCCESS_PARAM, SUCCESS_FLAG_VALUE)
    }

    /// Queue the success notice if this is the post-restore page load.
    ///
    /// Requires both the `srsuccess` signal and a live success flag. The flag
    /// is consumed, so a reload shows nothing. Returns whether a notice was
    /// queued.
    pub async fn check_success_notice(&self, srsuccess: bool, notices: &mut AdminNotices) -> bool {
        if !srsuccess {
            return false;
        }

        match self.transient.get(SUCCESS_FLAG).await {
            Ok(Some(flag)) if flag == SUCCESS_FLAG_VALUE => {}
            Ok(_) => return false,
            Err(e) => {
                warn!(error = %e, "failed to read restore success flag");
                return false;
            }
        }

        notices.push(notice::render_success_notice);
        if let Err(e) = self.transient.delete(SUCCESS_FLAG).await {
            warn!(error = %e, "failed to consume restore success flag");
        }
        true
    }
}

#[async_trait::async_trait]
impl OptionObserver for RestoreProtocol {
    async fn option_updated(&self, name: &str, old_value: &str, new_value: &str) {
        self.on_config_changed(name, old_value, new_value).await;
    }
}

impl std::fmt::Debug for RestoreProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreProtocol")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("email_sent", &self.email_sent())
            .finish_non_exhaustive()
    }
}

/// Append `name=value` to a URL's query string, URL-encoding the value.
/// A fragment, if any, stays at the end.
#[must_use]
pub fn add_query_arg(url: &str, name: &str, value: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };
    let mut out = format!("{base}{separator}{name}={}", urlencoding::encode(value));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::notifier::MemoryNotifier;
    use homeguard_storage::{
        ConfigStore, MemoryConfigStore, MemoryExpiringStore, StorageError,
    };
    use std::collections::HashSet;
    use std::sync::Mutex;

    const OLD: &str = "http://old.example";
    const NEW: &str = "http://new.example";

    /// Expiring store wrapper that fails writes to selected keys.
    #[derive(Default)]
    struct FlakyExpiringStore {
        inner: MemoryExpiringStore,
        failing: Mutex<HashSet<String>>,
        failing_deletes: Mutex<HashSet<String>>,
    }

    impl FlakyExpiringStore {
        fn fail_writes_to(&self, key: &str) {
            self.failing.lock().unwrap().insert(key.to_owned());
        }

        fn fail_deletes_of(&self, key: &str) {
            self.failing_deletes.lock().unwrap().insert(key.to_owned());
        }

        fn fails(&self, key: &str) -> bool {
            self.failing.lock().unwrap().contains(key)
        }
    }

    #[async_trait::async_trait]
    impl ExpiringStore for FlakyExpiringStore {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
            if self.fails(key) {
                return Err(StorageError::Write {
                    key: key.to_owned(),
                    reason: "injected".to_owned(),
                });
            }
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            if self.failing_deletes.lock().unwrap().contains(key) {
                return Err(StorageError::Delete {
                    key: key.to_owned(),
                    reason: "injected".to_owned(),
                });
            }
            self.inner.delete(key).await
        }
    }

    /// Config store wrapper that fails reads or writes of selected names.
    struct FlakyConfigStore {
        inner: MemoryConfigStore,
        failing: Mutex<HashSet<String>>,
        failing_reads: Mutex<HashSet<String>>,
    }

    impl FlakyConfigStore {
        fn fail_writes_to(&self, name: &str) {
            self.failing.lock().unwrap().insert(name.to_owned());
        }

        fn fail_reads_of(&self, name: &str) {
            self.failing_reads.lock().unwrap().insert(name.to_owned());
        }
    }

    #[async_trait::async_trait]
    impl ConfigStore for FlakyConfigStore {
        async fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
            if self.failing_reads.lock().unwrap().contains(name) {
                return Err(StorageError::Read {
                    key: name.to_owned(),
                    reason: "injected".to_owned(),
                });
            }
            self.inner.get(name).await
        }

        async fn set(&self, name: &str, value: &str) -> Result<(), StorageError> {
            if self.failing.lock().unwrap().contains(name) {
                return Err(StorageError::Write {
                    key: name.to_owned(),
                    reason: "injected".to_owned(),
                });
            }
            self.inner.set(name, value).await
        }
    }

    struct Harness {
        config: Arc<FlakyConfigStore>,
        transient: Arc<FlakyExpiringStore>,
        notifier: Arc<MemoryNotifier>,
        sink: Arc<MemoryEventSink>,
        events: Arc<EventLog>,
    }

    impl Harness {
        async fn new() -> Self {
            let events = Arc::new(EventLog::new());
            let sink = Arc::new(MemoryEventSink::new());
            events.add_sink(Arc::clone(&sink) as _).await;
            Self {
                config: Arc::new(FlakyConfigStore {
                    inner: MemoryConfigStore::with_values([
                        ("home", OLD),
                        ("siteurl", OLD),
                        ("admin_email", "admin@example.com"),
                    ]),
                    failing: Mutex::new(HashSet::new()),
                    failing_reads: Mutex::new(HashSet::new()),
                }),
                transient: Arc::new(FlakyExpiringStore::default()),
                notifier: Arc::new(MemoryNotifier::new()),
                sink,
                events,
            }
        }

        /// A fresh request: new `Options`, new protocol instance.
        async fn request(&self) -> (Arc<Options>, Arc<RestoreProtocol>) {
            self.request_with(ProtocolConfig::default()).await
        }

        async fn request_with(
            &self,
            config: ProtocolConfig,
        ) -> (Arc<Options>, Arc<RestoreProtocol>) {
            let options = Arc::new(Options::new(Arc::clone(&self.config) as _));
            let deps = ProtocolDeps {
                options: Arc::clone(&options),
                transient: Arc::clone(&self.transient) as _,
                notifier: Arc::clone(&self.notifier) as _,
                template: Arc::new(TextTemplate::default()),
                events: Arc::clone(&self.events),
            };
            let protocol = RestoreProtocol::attach(deps, config).await;
            (options, protocol)
        }

        async fn stored(&self, key: &str) -> Option<String> {
            self.transient.get(key).await.unwrap()
        }

        async fn option(&self, name: &str) -> Option<String> {
            self.config.get(name).await.unwrap()
        }
    }

    #[tokio::test]
    async fn unwatched_change_is_ignored() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;

        options.update("blogname", "Renamed").await.unwrap();

        assert_eq!(h.stored(RESTORE_KEY).await, None);
        assert_eq!(h.notifier.attempts().await, 0);
    }

    #[tokio::test]
    async fn change_captures_backup_key_and_sends_one_email() {
        let h = Harness::new().await;
        let (options, protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();
        options.update("siteurl", NEW).await.unwrap();

        assert_eq!(h.stored("old_home").await.as_deref(), Some(OLD));
        assert_eq!(h.stored("old_siteurl").await.as_deref(), Some(OLD));
        assert!(h.stored(RESTORE_KEY).await.is_some());
        assert!(protocol.email_sent());

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "admin@example.com");
        assert_eq!(
            h.sink.events().await,
            vec![RestoreEvent::EmailAttempted { success: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backup_ttl_is_at_most_half_an_hour() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;

        options.update("siteurl", NEW).await.unwrap();

        let ttl = h.transient.inner.ttl_remaining("old_siteurl").await.unwrap();
        assert!(ttl <= BACKUP_TTL);
        let key_ttl = h.transient.inner.ttl_remaining(RESTORE_KEY).await.unwrap();
        assert!(key_ttl <= RESTORE_KEY_TTL);
    }

    #[tokio::test]
    async fn email_links_to_live_home_with_key() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();

        let key = h.stored(RESTORE_KEY).await.unwrap();
        let body = &h.notifier.sent().await[0].body;
        assert!(body.contains(&format!("{NEW}?srk={key}")), "body: {body}");
    }

    #[tokio::test]
    async fn previous_home_link_base_uses_cached_old_home() {
        let h = Harness::new().await;
        let (options, _protocol) = h
            .request_with(ProtocolConfig {
                link_base: LinkBase::PreviousHome,
                ..ProtocolConfig::default()
            })
            .await;

        options.update("home", NEW).await.unwrap();

        let key = h.stored(RESTORE_KEY).await.unwrap();
        let body = &h.notifier.sent().await[0].body;
        assert!(body.contains(&format!("{OLD}?srk={key}")), "body: {body}");
    }

    #[tokio::test]
    async fn recipient_override_wins_over_admin_email() {
        let h = Harness::new().await;
        let (options, _protocol) = h
            .request_with(ProtocolConfig {
                recipient: Some("ops@example.com".to_owned()),
                ..ProtocolConfig::default()
            })
            .await;

        options.update("siteurl", NEW).await.unwrap();
        assert_eq!(h.notifier.sent().await[0].recipient, "ops@example.com");
    }

    #[tokio::test]
    async fn stored_key_survives_later_changes_and_requests() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        options.update("siteurl", NEW).await.unwrap();
        assert_eq!(h.stored(RESTORE_KEY).await.as_deref(), Some(key.as_str()));

        let (options, _protocol) = h.request().await;
        options.update("home", "http://third.example").await.unwrap();
        assert_eq!(h.stored(RESTORE_KEY).await.as_deref(), Some(key.as_str()));
    }

    #[tokio::test]
    async fn expired_key_is_reissued() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let first = h.stored(RESTORE_KEY).await.unwrap();

        h.transient.delete(RESTORE_KEY).await.unwrap();

        let (options, _protocol) = h.request().await;
        options.update("home", "http://third.example").await.unwrap();
        let second = h.stored(RESTORE_KEY).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn change_to_backup_value_is_ignored() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();

        let (options, _protocol) = h.request().await;
        options.update("home", OLD).await.unwrap();

        // Backup unchanged and no second email from the new instance.
        assert_eq!(h.stored("old_home").await.as_deref(), Some(OLD));
        assert_eq!(h.notifier.attempts().await, 1);
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_within_burst() {
        let h = Harness::new().await;
        h.notifier.set_refusing(true);
        let (options, protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();
        assert!(!protocol.email_sent());

        h.notifier.set_refusing(false);
        options.update("siteurl", NEW).await.unwrap();
        assert!(protocol.email_sent());

        assert_eq!(h.notifier.attempts().await, 2);
        assert_eq!(
            h.sink.events().await,
            vec![
                RestoreEvent::EmailAttempted { success: false },
                RestoreEvent::EmailAttempted { success: true },
            ]
        );
    }

    #[tokio::test]
    async fn key_write_failure_skips_email() {
        let h = Harness::new().await;
        h.transient.fail_writes_to(RESTORE_KEY);
        let (options, _protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();

        assert_eq!(h.stored("old_home").await.as_deref(), Some(OLD));
        assert_eq!(h.notifier.attempts().await, 0);
    }

    #[tokio::test]
    async fn backup_write_failure_skips_email() {
        let h = Harness::new().await;
        h.transient.fail_writes_to("old_siteurl");
        let (options, _protocol) = h.request().await;

        options.update("siteurl", NEW).await.unwrap();

        assert!(h.stored(RESTORE_KEY).await.is_some());
        assert_eq!(h.notifier.attempts().await, 0);
    }

    #[tokio::test]
    async fn stale_backup_that_cannot_be_cleared_skips_email() {
        let h = Harness::new().await;
        h.transient.fail_deletes_of("old_home");
        let (options, _protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();

        assert_eq!(h.stored("old_home").await, None);
        assert!(h.stored(RESTORE_KEY).await.is_some());
        assert_eq!(h.notifier.attempts().await, 0);
    }

    #[tokio::test]
    async fn missing_recipient_skips_email_without_event() {
        let h = Harness::new().await;
        h.config.inner.set("admin_email", "").await.unwrap();
        let (options, protocol) = h.request().await;

        options.update("home", NEW).await.unwrap();

        assert!(!protocol.email_sent());
        assert_eq!(h.notifier.attempts().await, 0);
        assert!(h.sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn absent_or_empty_key_is_a_noop() {
        let h = Harness::new().await;
        let (_options, protocol) = h.request().await;

        assert_eq!(
            protocol.attempt_restore(None).await.unwrap(),
            RestoreOutcome::Idle
        );
        assert_eq!(
            protocol.attempt_restore(Some("")).await.unwrap(),
            RestoreOutcome::Idle
        );
        assert!(h.sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn wrong_key_is_fatal_and_touches_nothing() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        options.update("siteurl", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();
        h.transient
            .set(SUCCESS_FLAG, SUCCESS_FLAG_VALUE, SUCCESS_FLAG_TTL)
            .await
            .unwrap();

        let (_options, protocol) = h.request().await;
        let err = protocol.attempt_restore(Some("not-the-key")).await.unwrap_err();
        assert!(matches!(err, RestoreError::InvalidKey));
        assert_eq!(err.to_string(), "Restore key is invalid.");

        assert_eq!(h.stored(RESTORE_KEY).await, Some(key));
        assert_eq!(h.stored("old_home").await.as_deref(), Some(OLD));
        assert_eq!(h.stored("old_siteurl").await.as_deref(), Some(OLD));
        assert_eq!(h.stored(SUCCESS_FLAG).await.as_deref(), Some("1"));
        assert_eq!(h.option("home").await.as_deref(), Some(NEW));
    }

    #[tokio::test]
    async fn any_key_is_invalid_when_none_is_stored() {
        let h = Harness::new().await;
        let (_options, protocol) = h.request().await;
        let result = protocol.attempt_restore(Some("anything")).await;
        assert!(matches!(result, Err(RestoreError::InvalidKey)));
        assert_eq!(h.sink.events().await, vec![RestoreEvent::RestoreRejected]);
    }

    #[tokio::test]
    async fn valid_key_restores_both_and_consumes_state() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        options.update("siteurl", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        let (_options, protocol) = h.request().await;
        let outcome = protocol.attempt_restore(Some(&key)).await.unwrap();

        assert_eq!(
            outcome,
            RestoreOutcome::Applied {
                restored: vec![WatchedName::Home, WatchedName::SiteUrl],
                redirect_to: format!("{OLD}/wp-admin?srsuccess=1"),
            }
        );
        assert_eq!(h.option("home").await.as_deref(), Some(OLD));
        assert_eq!(h.option("siteurl").await.as_deref(), Some(OLD));
        assert_eq!(h.stored(RESTORE_KEY).await, None);
        assert_eq!(h.stored("old_home").await, None);
        assert_eq!(h.stored("old_siteurl").await, None);
        assert_eq!(h.stored(SUCCESS_FLAG).await.as_deref(), Some("1"));

        // The restore writes must not re-arm the protocol.
        assert_eq!(h.notifier.attempts().await, 1);
    }

    #[tokio::test]
    async fn key_is_single_use() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        let (_options, protocol) = h.request().await;
        protocol.attempt_restore(Some(&key)).await.unwrap();

        let (_options, protocol) = h.request().await;
        let again = protocol.attempt_restore(Some(&key)).await;
        assert!(matches!(again, Err(RestoreError::InvalidKey)));
    }

    #[tokio::test]
    async fn partial_restore_still_consumes_key() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        options.update("siteurl", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        h.config.fail_writes_to("home");
        let (_options, protocol) = h.request().await;
        let outcome = protocol.attempt_restore(Some(&key)).await.unwrap();

        assert!(matches!(
            outcome,
            RestoreOutcome::Applied { ref restored, .. } if restored == &vec![WatchedName::SiteUrl]
        ));
        assert_eq!(h.option("siteurl").await.as_deref(), Some(OLD));
        assert_eq!(h.option("home").await.as_deref(), Some(NEW));
        assert_eq!(h.stored("old_home").await.as_deref(), Some(OLD));
        assert_eq!(h.stored("old_siteurl").await, None);
        assert_eq!(h.stored(RESTORE_KEY).await, None);
    }

    #[tokio::test]
    async fn nothing_restored_keeps_key_valid() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        h.config.fail_writes_to("home");
        let (_options, protocol) = h.request().await;
        let outcome = protocol.attempt_restore(Some(&key)).await.unwrap();

        assert_eq!(outcome, RestoreOutcome::Idle);
        assert_eq!(h.stored(RESTORE_KEY).await, Some(key));
        assert_eq!(h.stored(SUCCESS_FLAG).await, None);
    }

    #[tokio::test]
    async fn success_notice_is_shown_once() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();
        let (_options, protocol) = h.request().await;
        protocol.attempt_restore(Some(&key)).await.unwrap();

        let (_options, protocol) = h.request().await;
        let mut notices = AdminNotices::new();
        assert!(protocol.check_success_notice(true, &mut notices).await);
        assert_eq!(notices.render(), notice::render_success_notice());
        assert_eq!(h.stored(SUCCESS_FLAG).await, None);

        let (_options, protocol) = h.request().await;
        let mut notices = AdminNotices::new();
        assert!(!protocol.check_success_notice(true, &mut notices).await);
        assert!(notices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn success_flag_expires_after_five_minutes() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("home", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();
        let (_options, protocol) = h.request().await;
        protocol.attempt_restore(Some(&key)).await.unwrap();

        let ttl = h.transient.inner.ttl_remaining(SUCCESS_FLAG).await.unwrap();
        assert!(ttl <= SUCCESS_FLAG_TTL);

        tokio::time::advance(Duration::from_secs(301)).await;

        let (_options, protocol) = h.request().await;
        let mut notices = AdminNotices::new();
        assert!(!protocol.check_success_notice(true, &mut notices).await);
        assert!(notices.is_empty());
        assert_eq!(h.stored(SUCCESS_FLAG).await, None);
    }

    #[tokio::test]
    async fn unreadable_home_after_restore_redirects_relative() {
        let h = Harness::new().await;
        let (options, _protocol) = h.request().await;
        options.update("siteurl", NEW).await.unwrap();
        let key = h.stored(RESTORE_KEY).await.unwrap();

        h.config.fail_reads_of("home");
        let (_options, protocol) = h.request().await;
        let outcome = protocol.attempt_restore(Some(&key)).await.unwrap();

        assert_eq!(
            outcome,
            RestoreOutcome::Applied {
                restored: vec![WatchedName::SiteUrl],
                redirect_to: "/wp-admin?srsuccess=1".to_owned(),
            }
        );
        assert_eq!(h.option("siteurl").await.as_deref(), Some(OLD));
        assert_eq!(h.stored(RESTORE_KEY).await, None);
        assert_eq!(h.stored(SUCCESS_FLAG).await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn success_notice_requires_signal() {
        let h = Harness::new().await;
        h.transient
            .set(SUCCESS_FLAG, SUCCESS_FLAG_VALUE, SUCCESS_FLAG_TTL)
            .await
            .unwrap();
        let (_options, protocol) = h.request().await;

        let mut notices = AdminNotices::new();
        assert!(!protocol.check_success_notice(false, &mut notices).await);
        assert!(notices.is_empty());
        assert_eq!(h.stored(SUCCESS_FLAG).await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn redirect_respects_admin_path_and_trailing_slash() {
        let h = Harness::new().await;
        h.config.inner.set("home", "http://old.example/").await.unwrap();
        let (_options, protocol) = h
            .request_with(ProtocolConfig {
                admin_path: "dashboard".to_owned(),
                ..ProtocolConfig::default()
            })
            .await;

        assert_eq!(
            protocol.success_redirect().await.unwrap(),
            "http://old.example/dashboard?srsuccess=1"
        );
    }

    #[test]
    fn add_query_arg_handles_existing_query_and_fragment() {
        assert_eq!(add_query_arg("http://a", "srk", "k"), "http://a?srk=k");
        assert_eq!(
            add_query_arg("http://a/?p=1", "srk", "k"),
            "http://a/?p=1&srk=k"
        );
        assert_eq!(add_query_arg("http://a/?", "srk", "k"), "http://a/?srk=k");
        assert_eq!(
            add_query_arg("http://a/#top", "srk", "a b"),
            "http://a/?srk=a%20b#top"
        );
    }

    #[test]
    fn link_base_parses() {
        assert_eq!("live-home".parse::<LinkBase>(), Ok(LinkBase::LiveHome));
        assert_eq!("Previous".parse::<LinkBase>(), Ok(LinkBase::PreviousHome));
        assert!("elsewhere".parse::<LinkBase>().is_err());
    }
}

//! Admin-area notices.
//!
//! Notices are queued as one-shot render callbacks while a request is being
//! processed and rendered together when the admin page is produced.
//! [`AdminNotices::render`] consumes the queue, so a callback can only ever
//! run once.

/// CSS class list of the post-restore success notice.
pub const SUCCESS_NOTICE_CLASS: &str = "notice notice-success is-dismissible";

/// Message shown after a successful restore.
pub const SUCCESS_NOTICE_MESSAGE: &str =
    "Your previous site address settings have been restored.";

type NoticeRenderer = Box<dyn FnOnce() -> String + Send>;

/// One request's queue of pending notices.
#[derive(Default)]
pub struct AdminNotices {
    pending: Vec<NoticeRenderer>,
}

impl AdminNotices {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a render callback for the notice phase.
    pub fn push<F>(&mut self, render: F)
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.pending.push(Box::new(render));
    }

    /// Number of queued notices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no notices are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every queued callback in order and join their output.
    #[must_use]
    pub fn render(self) -> String {
        self.pending.into_iter().map(|render| render()).collect()
    }
}

impl std::fmt::Debug for AdminNotices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminNotices")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// The post-restore success notice as an HTML fragment.
#[must_use]
pub fn render_success_notice() -> String {
    format!(
        r#"<div class="{SUCCESS_NOTICE_CLASS}"><p>{}</p></div>"#,
        escape_html(SUCCESS_NOTICE_MESSAGE)
    )
}

/// Escape text for inclusion in HTML element content or attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

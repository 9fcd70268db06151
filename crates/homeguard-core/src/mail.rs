//! Restore-link email text.
//!
//! Subject and body are produced by a [`MailTemplate`], so deployments can
//! reword the message. The body carries [`RESTORE_URL_PLACEHOLDER`], which is
//! replaced with the restore link when the message is composed.

/// Token in the body text that is replaced with the restore URL.
pub const RESTORE_URL_PLACEHOLDER: &str = "{restore_url}";

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "Your site address was changed";

/// Default body text.
pub const DEFAULT_BODY: &str = "The site address settings of your site were just changed.\n\
\n\
If this was intentional, you can ignore this message.\n\
\n\
If the change locked you out of your site, open the link below within the next \
30 minutes to restore the previous settings:\n\
\n\
{restore_url}\n";

/// Source of the restore-link email text.
pub trait MailTemplate: Send + Sync {
    /// The subject line.
    fn subject(&self) -> String;

    /// The body text, containing [`RESTORE_URL_PLACEHOLDER`].
    fn body(&self) -> String;
}

/// A composed message ready for a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub body: String,
}

/// Render `template` with `restore_url` substituted into the body.
#[must_use]
pub fn compose(template: &dyn MailTemplate, restore_url: &str) -> MailMessage {
    MailMessage {
        subject: template.subject(),
        body: template
            .body()
            .replace(RESTORE_URL_PLACEHOLDER, restore_url),
    }
}

/// Template backed by fixed strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    subject: String,
    body: String,
}

impl TextTemplate {
    /// Replace the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Replace the body text.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

impl Default for TextTemplate {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_owned(),
            body: DEFAULT_BODY.to_owned(),
        }
    }
}

impl MailTemplate for TextTemplate {
    fn subject(&self) -> String {
        self.subject.clone()
    }

    fn body(&self) -> String {
        self.body.clone()
    }
}

//! The two configuration names the restore protocol guards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A watched configuration name.
///
/// Both values hold the canonical base URL of the deployment; losing access
/// through both at once is what the restore protocol protects against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchedName {
    /// The public site address (`home`).
    Home,
    /// The address the application itself is served from (`siteurl`).
    SiteUrl,
}

impl WatchedName {
    /// Every watched name, in restore order.
    pub const ALL: [Self; 2] = [Self::Home, Self::SiteUrl];

    /// Map a configuration name to a watched name, if it is one.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "home" => Some(Self::Home),
            "siteurl" => Some(Self::SiteUrl),
            _ => None,
        }
    }

    /// The configuration store name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::SiteUrl => "siteurl",
        }
    }

    /// The expiring-store key holding this name's backup value.
    #[must_use]
    pub fn backup_key(self) -> &'static str {
        match self {
            Self::Home => "old_home",
            Self::SiteUrl => "old_siteurl",
        }
    }
}

impl fmt::Display for WatchedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

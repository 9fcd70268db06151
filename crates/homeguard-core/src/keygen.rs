//! Restore key generation.
//!
//! A restore key is 16 bytes from the thread-local CSPRNG (seeded from the
//! OS), rendered as URL-safe base64 without padding so it can be dropped
//! into a query string untouched. The generator memoizes the key for its own
//! lifetime, which is one request.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Bytes of entropy in a restore key.
pub const RESTORE_KEY_BYTES: usize = 16;

/// Produces and memoizes the restore key for one protocol instance.
#[derive(Default)]
pub struct RestoreKeyGenerator {
    key: OnceLock<String>,
}

impl RestoreKeyGenerator {
    /// Create a generator with no key yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized key, generating it on first call.
    pub fn current_key(&self) -> &str {
        self.key.get_or_init(generate_key)
    }

    /// Seed the memo with a key that is already persisted, so this instance
    /// reuses it instead of minting a competing one. No-op once a key is
    /// memoized.
    pub fn adopt(&self, existing: &str) {
        let _ = self.key.set(existing.to_owned());
    }

    /// Whether a key has been generated or adopted.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.key.get().is_some()
    }
}

impl std::fmt::Debug for RestoreKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreKeyGenerator")
            .field("key", &self.key.get().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; RESTORE_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

//! Core library for `homeguard`.
//!
//! Implements the self-service rollback protocol for a site's identity
//! settings (`home` and `siteurl`): when either changes, the prior value is
//! backed up, a single-use restore key is issued, and a restore link is
//! mailed to the administrator. Presenting the key restores the backups.
//!
//! This crate depends on `homeguard-storage` for the store traits and knows
//! nothing about HTTP.

pub mod error;
pub mod events;
mod jsonl;
pub mod keygen;
pub mod mail;
pub mod notice;
pub mod notifier;
pub mod options;
pub mod protocol;
pub mod watched;

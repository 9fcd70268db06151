//! `homeguard` HTTP server.
//!
//! Wires the restore protocol into an Axum application. Every request gets
//! its own protocol instance; a restore key presented on any URL is handled
//! before routing.

pub mod config;
pub mod error;
pub mod middleware;
#[cfg(feature = "webhook-notifier")]
pub mod notifier;
pub mod routes;
pub mod state;

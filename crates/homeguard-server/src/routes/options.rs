//! Configuration routes: `/v1/options/{name}`
//!
//! Writes go through the request's `Options`, so a change to `home` or
//! `siteurl` arms the restore protocol before the response is sent.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::state::{AppState, RequestContext};

/// Longest accepted option name.
const MAX_NAME_LEN: usize = 191;

/// Build the `/v1/options` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{name}", get(read_option).put(write_option))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct OptionResponse {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteOptionRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct WriteOptionResponse {
    pub name: String,
    pub value: String,
    /// `false` when the stored value already matched.
    pub changed: bool,
    /// Whether this request mailed a restore link.
    pub restore_link_sent: bool,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Read one option.
async fn read_option(
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<Json<OptionResponse>, AppError> {
    validate_name(&name)?;

    let value = ctx
        .options
        .get(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("option '{name}' not found")))?;

    Ok(Json(OptionResponse { name, value }))
}

/// Change one option.
async fn write_option(
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
    Json(body): Json<WriteOptionRequest>,
) -> Result<Json<WriteOptionResponse>, AppError> {
    validate_name(&name)?;

    let changed = ctx.options.update(&name, &body.value).await?;
    if changed {
        info!(option = %name, "option updated");
    }

    Ok(Json(WriteOptionResponse {
        name,
        value: body.value,
        changed,
        restore_link_sent: ctx.protocol.email_sent(),
    }))
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::BadRequest("option name must not be empty".to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "option name exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

//! Request middleware for the `homeguard` server.
//!
//! [`restore_middleware`] wraps every route: it creates the request's
//! protocol instance and handles a presented restore key before any handler
//! runs. [`api_token_middleware`] guards the options API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use homeguard_core::protocol::{RESTORE_KEY_PARAM, RestoreOutcome};

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the options API token.
pub const API_TOKEN_HEADER: &str = "x-homeguard-token";

/// Set up the request's protocol instance and act on `srk`.
///
/// - no key: continue with a [`RequestContext`](crate::state::RequestContext)
///   in the extensions
/// - invalid key: 403 with the fixed message, request ends
/// - applied: 302 to the admin page, request ends
pub async fn restore_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = state.begin_request().await;

    let presented = match Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        Ok(Query(mut params)) => params.remove(RESTORE_KEY_PARAM),
        Err(e) => {
            debug!(error = %e, "unparseable query string, no restore key read");
            None
        }
    };

    match ctx.protocol.attempt_restore(presented.as_deref()).await {
        Ok(RestoreOutcome::Idle) => {}
        Ok(RestoreOutcome::Applied {
            restored,
            redirect_to,
        }) => {
            info!(restored = ?restored, location = %redirect_to, "restore applied, redirecting");
            return (StatusCode::FOUND, [(header::LOCATION, redirect_to)]).into_response();
        }
        Err(e) => return AppError::from(e).into_response(),
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}

/// Require `X-Homeguard-Token` when an API token is configured.
pub async fn api_token_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ref expected) = state.api_token else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(API_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
            next.run(req).await
        }
        Some(_) => AppError::Unauthorized("invalid API token".to_owned()).into_response(),
        None => AppError::Unauthorized(format!("missing {API_TOKEN_HEADER} header"))
            .into_response(),
    }
}

//! HTTP routes for the `homeguard` server.
//!
//! - `/v1/options/{name}`: read and change configuration values
//! - `/v1/health`: liveness probe
//! - `/` and the admin path: HTML pages
//!
//! [`router`] applies the restore middleware to every route, so a restore
//! link may point at any page of the site.

pub mod admin;
pub mod options;
pub mod sys;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{api_token_middleware, restore_middleware};
use crate::state::AppState;

/// In-flight options API requests.
const API_CONCURRENCY: usize = 32;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .nest("/v1/options", options::router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(API_CONCURRENCY))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            api_token_middleware,
        ));

    Router::new()
        .merge(api_routes)
        .merge(sys::router())
        .merge(admin::router(&state.protocol.admin_path))
        .fallback(not_found)
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            restore_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Unknown paths still pass through the restore middleware first.
async fn not_found() -> AppError {
    AppError::NotFound("no such page".to_owned())
}

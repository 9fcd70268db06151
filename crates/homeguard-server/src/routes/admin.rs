//! HTML pages: the landing page at `/` and the admin page.
//!
//! The admin page is where a restore redirect lands. When the request
//! carries `srsuccess=1` and the success flag is still live, the page shows
//! the one-time restore notice.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use axum::{Extension, Router};

use homeguard_core::notice::{AdminNotices, escape_html};
use homeguard_core::protocol::{SUCCESS_FLAG_VALUE, SUCCESS_PARAM};
use homeguard_core::watched::WatchedName;

use crate::error::AppError;
use crate::state::{AppState, RequestContext};

/// Build the page router. The admin page is mounted at `admin_path`.
pub fn router(admin_path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(landing_page))
        .route(admin_path, get(admin_page))
}

/// Site landing page.
async fn landing_page(
    Extension(ctx): Extension<RequestContext>,
) -> Result<Html<String>, AppError> {
    let home = ctx
        .options
        .get(WatchedName::Home.as_str())
        .await?
        .unwrap_or_default();

    let body = format!(
        "<h1>homeguard</h1>\n<p>Site address: <code>{}</code></p>\n",
        escape_html(&home)
    );
    Ok(Html(page("homeguard", &body)))
}

/// Admin dashboard. Renders queued notices above the current address
/// settings.
async fn admin_page(
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, AppError> {
    let srsuccess = params
        .get(SUCCESS_PARAM)
        .is_some_and(|v| v == SUCCESS_FLAG_VALUE);

    let mut notices = AdminNotices::new();
    ctx.protocol
        .check_success_notice(srsuccess, &mut notices)
        .await;

    let mut rows = String::new();
    for watched in WatchedName::ALL {
        let value = ctx
            .options
            .get(watched.as_str())
            .await?
            .unwrap_or_default();
        rows.push_str(&format!(
            "<tr><th>{}</th><td><code>{}</code></td></tr>\n",
            watched,
            escape_html(&value)
        ));
    }

    let body = format!(
        "{}<h1>Dashboard</h1>\n<table>\n{rows}</table>\n",
        notices.render()
    );
    Ok(Html(page("Dashboard", &body)))
}

fn page(title: &str, body: &str) -> String {
    let mut html = String::with_capacity(PAGE_HEAD.len() + body.len() + 64);
    html.push_str(&PAGE_HEAD.replace("{{TITLE}}", &escape_html(title)));
    html.push_str(body);
    html.push_str("</main></body></html>\n");
    html
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"/><meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>{{TITLE}}</title>
<style>
body{font-family:-apple-system,sans-serif;background:#f0f0f1;color:#1d2327;margin:0}
main{max-width:800px;margin:40px auto;padding:0 24px}
.notice{background:#fff;border-left:4px solid #72aee6;padding:1px 12px;margin:5px 0 15px}
.notice-success{border-left-color:#00a32a}
table{border-collapse:collapse}th,td{text-align:left;padding:6px 12px}
</style></head><body><main>
"#;

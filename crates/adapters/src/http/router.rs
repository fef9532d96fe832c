use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post, put};

use super::assets::spa_fallback;
use super::group_handler::{create_group, delete_group, list_groups, update_group};
use super::metrics_handler::metrics;
use super::rule_handler::{
    create_rule, delete_rule, import_rules, list_actions, list_rules, list_rules_by_group,
    update_rule_action, update_rule_group,
};
use super::state::AppState;
use super::traffic_handler::get_traffic;

/// Per-request log line: method, path, status, latency.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    if status >= 500 {
        tracing::error!(%method, path, status, ?elapsed, "http request");
    } else if status >= 400 {
        tracing::warn!(%method, path, status, ?elapsed, "http request");
    } else {
        tracing::info!(%method, path, status, ?elapsed, "http request");
    }
    response
}

/// Build the management API router.
///
/// Static segments (`/api/ip/action`, `/api/ip/import`) take priority
/// over the `{key}` captures on the same prefix.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/traffic", get(get_traffic))
        .route("/api/ip", get(list_rules).post(create_rule))
        .route("/api/ip/import", post(import_rules))
        .route(
            "/api/ip/action",
            get(list_actions).put(update_rule_action),
        )
        .route("/api/ip/group", put(update_rule_group))
        .route(
            "/api/ip/{key}",
            get(list_rules_by_group).delete(delete_rule),
        )
        .route(
            "/api/group",
            get(list_groups).post(create_group).put(update_group),
        )
        .route("/api/group/{id}", delete(delete_group))
        .route("/metrics", get(metrics))
        .fallback(spa_fallback)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

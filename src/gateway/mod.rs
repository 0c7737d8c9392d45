pub mod keys;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

/// 组装全部路由（main 与测试共用）。
pub fn routes(state: Arc<keys::KeysState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/get", get(keys::handle_get_key))
        .route("/set", post(keys::handle_set_key))
        .route("/stats", get(keys::handle_stats))
        .with_state(state)
}

async fn handle_health() -> &'static str {
    "ok"
}

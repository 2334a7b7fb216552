//! 路由配置模块

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 存储运维路由，挂载在 `/api/storage` 下
pub fn storage_routes() -> Router<AppState> {
    Router::new()
        .route("/init", post(handlers::storage::init_storage))
        .route("/migrate", post(handlers::storage::migrate))
        .route("/migration-status", get(handlers::storage::migration_status))
        .route("/table-counts", get(handlers::storage::table_counts))
        .route("/document-stats", get(handlers::storage::document_stats))
}

/// 完整应用路由
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/storage", storage_routes())
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state)
}

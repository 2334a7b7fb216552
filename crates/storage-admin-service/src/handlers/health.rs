//! 健康检查

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// 存活探针
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "storage-admin-service"
    }))
}

/// 就绪探针：关系库不可用时标记为 degraded
pub async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    let relational_ok = state.admin.relational_ready().await;
    let document = state.admin.document_stats().await.ok().map(|s| s.mode);

    Json(json!({
        "status": if relational_ok { "ok" } else { "degraded" },
        "service": "storage-admin-service",
        "checks": {
            "relational": if relational_ok { "ok" } else { "fail" },
            "document": document
        }
    }))
}

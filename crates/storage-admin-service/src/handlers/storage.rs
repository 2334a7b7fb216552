//! 存储运维 API 处理器
//!
//! 建表与迁移、迁移状态、表行数、文档库状态。

use std::time::Instant;

use axum::{Json, extract::State};
use hybrid_storage::MigrationReport;
use tracing::{info, instrument};

use crate::{
    dto::{ApiResponse, DocumentStatsDto, MigrationStatusDto, TableCountsDto},
    error::AdminError,
    state::AppState,
};

/// 建表并迁移
///
/// POST /api/storage/init
#[instrument(skip(state))]
pub async fn init_storage(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MigrationReport>>, AdminError> {
    let start = Instant::now();
    let report = state.admin.init_and_migrate().await?;
    info!(
        migrated = report.migrated,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Storage initialized"
    );
    Ok(Json(ApiResponse::success_with_message(report, "建表并迁移完成")))
}

/// 迁移文档库数据
///
/// POST /api/storage/migrate
#[instrument(skip(state))]
pub async fn migrate(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MigrationReport>>, AdminError> {
    let report = state.admin.migrate().await?;
    let message = if report.cancelled {
        "迁移已中止，可重新执行"
    } else {
        "迁移完成"
    };
    Ok(Json(ApiResponse::success_with_message(report, message)))
}

/// 迁移状态
///
/// GET /api/storage/migration-status
pub async fn migration_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MigrationStatusDto>>, AdminError> {
    let status = state.admin.migration_status().await?;
    Ok(Json(ApiResponse::success(status)))
}

/// 各关系表行数
///
/// GET /api/storage/table-counts
pub async fn table_counts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TableCountsDto>>, AdminError> {
    let counts = state.admin.table_counts().await?;
    Ok(Json(ApiResponse::success(counts.into())))
}

/// 文档库模式与同步统计
///
/// GET /api/storage/document-stats
pub async fn document_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DocumentStatsDto>>, AdminError> {
    let stats = state.admin.document_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

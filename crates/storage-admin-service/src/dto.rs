//! 请求与响应 DTO

use std::collections::BTreeMap;

use hybrid_storage::{Collection, MigrationReport, Mode, SyncStatsSnapshot};
use serde::Serialize;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 迁移状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatusDto {
    /// 关系库中已存在的表
    pub tables: Vec<String>,
    /// 尚未创建的集合表
    pub missing_tables: Vec<String>,
    pub migration_running: bool,
    /// 本实例最近一次迁移的报告
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<MigrationReport>,
}

impl MigrationStatusDto {
    pub fn new(
        tables: Vec<String>,
        migration_running: bool,
        last_report: Option<MigrationReport>,
    ) -> Self {
        let missing_tables = Collection::ALL
            .iter()
            .map(|c| c.as_str())
            .filter(|name| !tables.iter().any(|t| t == name))
            .map(String::from)
            .collect();
        Self {
            tables,
            missing_tables,
            migration_running,
            last_report,
        }
    }
}

/// 各表行数
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCountsDto {
    pub counts: BTreeMap<Collection, i64>,
    pub total: i64,
}

impl From<BTreeMap<Collection, i64>> for TableCountsDto {
    fn from(counts: BTreeMap<Collection, i64>) -> Self {
        let total = counts.values().sum();
        Self { counts, total }
    }
}

/// 文档库状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatsDto {
    pub mode: Mode,
    /// 降级模式下各集合的内存文档数；持久模式为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<BTreeMap<Collection, usize>>,
    pub sync: SyncStatsSnapshot,
}

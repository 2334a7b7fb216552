//! 混合存储错误类型
//!
//! 主路径（调用方直接发起的读写）上的失败总是向上传播；
//! 回填与迁移的失败按记录隔离，只记录日志与指标，不会出现在这里。

use thiserror::Error;

use crate::models::Collection;

/// 混合存储错误类型
#[derive(Debug, Error)]
pub enum StorageError {
    // === 记录 ===
    #[error("记录不存在: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("无效的记录: {0}")]
    InvalidRecord(String),

    #[error("未知集合: {0}")]
    UnknownCollection(String),

    #[error("不支持的查询运算符: {0}")]
    InvalidOperator(String),

    // === 存储 ===
    #[error("关系库错误: {0}")]
    Relational(#[from] sqlx::Error),

    #[error("文档库错误: {0}")]
    Document(String),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 双写中至少一侧失败；成功的一侧不会回滚
    #[error(
        "双写失败: {operation} {collection}/{id} (document: {}, relational: {})",
        leg_summary(.document),
        leg_summary(.relational)
    )]
    DualWrite {
        operation: &'static str,
        collection: Collection,
        id: String,
        document: Option<Box<StorageError>>,
        relational: Option<Box<StorageError>>,
    },

    #[error("操作超时: {operation} 超过 {timeout_ms}ms")]
    DeadlineExceeded {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 混合存储 Result 类型别名
pub type Result<T> = std::result::Result<T, StorageError>;

fn leg_summary(leg: &Option<Box<StorageError>>) -> String {
    match leg {
        Some(err) => err.to_string(),
        None => "ok".to_string(),
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Document(err.to_string())
    }
}

impl From<loyalty_shared::error::SharedError> for StorageError {
    fn from(err: loyalty_shared::error::SharedError) -> Self {
        use loyalty_shared::error::SharedError;
        match err {
            SharedError::Database(e) => Self::Relational(e),
            SharedError::Redis(e) => Self::Document(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl StorageError {
    /// 由两侧结果组合双写错误，两侧都成功时返回 None
    pub(crate) fn combine_legs(
        operation: &'static str,
        collection: Collection,
        id: &str,
        document: std::result::Result<(), StorageError>,
        relational: std::result::Result<(), StorageError>,
    ) -> Option<Self> {
        if document.is_ok() && relational.is_ok() {
            return None;
        }
        Some(Self::DualWrite {
            operation,
            collection,
            id: id.to_string(),
            document: document.err().map(Box::new),
            relational: relational.err().map(Box::new),
        })
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Relational(_) | Self::Document(_) | Self::DeadlineExceeded { .. } => true,
            Self::DualWrite {
                document,
                relational,
                ..
            } => [document, relational]
                .into_iter()
                .flatten()
                .all(|e| e.is_retryable()),
            _ => false,
        }
    }

    /// 文档库一侧是否失败（双写时检查对应分支）
    pub fn document_failed(&self) -> bool {
        match self {
            Self::Document(_) => true,
            Self::DualWrite { document, .. } => document.is_some(),
            _ => false,
        }
    }

    /// 关系库一侧是否失败（双写时检查对应分支）
    pub fn relational_failed(&self) -> bool {
        match self {
            Self::Relational(_) => true,
            Self::DualWrite { relational, .. } => relational.is_some(),
            _ => false,
        }
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidRecord(_) => "INVALID_RECORD",
            Self::UnknownCollection(_) => "UNKNOWN_COLLECTION",
            Self::InvalidOperator(_) => "INVALID_OPERATOR",
            Self::Relational(_) => "RELATIONAL_STORE_ERROR",
            Self::Document(_) => "DOCUMENT_STORE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::DualWrite { .. } => "DUAL_WRITE_FAILED",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

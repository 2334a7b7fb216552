//! 存储 Trait 定义
//!
//! 中介层只依赖这两个接口，两个存储的具体实现可以独立替换，也便于 mock 测试。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Collection, FieldFilter, Record};

/// 关系库接口（二级存储）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// 插入新行，主键冲突返回错误
    async fn insert(&self, collection: Collection, id: &str, record: &Record) -> Result<()>;

    /// 按主键整行覆盖写入
    async fn upsert(&self, collection: Collection, id: &str, record: &Record) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    async fn get_all(&self, collection: Collection, limit: usize) -> Result<Vec<Record>>;

    async fn query(&self, collection: Collection, filter: &FieldFilter) -> Result<Vec<Record>>;

    /// 合并部分字段，行不存在时不做任何事
    async fn update(&self, collection: Collection, id: &str, partial: &Record) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// 建表（幂等）
    async fn ensure_schema(&self) -> Result<()>;
}

/// 文档库接口（主存储）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 创建文档，未给出标识时生成 UUID，返回最终标识
    async fn create(
        &self,
        collection: Collection,
        id: Option<String>,
        record: &Record,
    ) -> Result<String>;

    async fn set(&self, collection: Collection, id: &str, record: &Record) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    async fn get_collection(&self, collection: Collection, limit: usize) -> Result<Vec<Record>>;

    async fn query(&self, collection: Collection, filter: &FieldFilter) -> Result<Vec<Record>>;

    /// 合并部分字段，文档不存在时不做任何事
    async fn update(&self, collection: Collection, id: &str, partial: &Record) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;
}

//! 文档库 → 关系库迁移
//!
//! 按固定顺序遍历全部集合，逐条 upsert 到关系库。upsert 幂等，迁移可以重复执行。
//! 单条记录失败只记录下来，不中断整个迁移；每条记录写入前检查一次取消信号。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics::{record_migration, record_migration_run};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{Collection, derive_id};
use crate::traits::{DocumentStore, RelationalStore};

/// 单条记录迁移失败
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
    pub collection: Collection,
    pub id: String,
    pub error: String,
}

/// 单个集合的迁移结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub read: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 批量读取失败时的错误，此时该集合被整体跳过
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

/// 迁移报告
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    /// 成功写入关系库的记录总数
    pub migrated: usize,
    /// 无法推导标识而跳过的记录数
    pub skipped: usize,
    pub failures: Vec<MigrationFailure>,
    pub per_collection: BTreeMap<Collection, CollectionReport>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            migrated: 0,
            skipped: 0,
            failures: Vec::new(),
            per_collection: BTreeMap::new(),
            cancelled: false,
            elapsed_ms: 0,
        }
    }
}

/// 迁移驱动
pub struct MigrationDriver<D, R>
where
    D: DocumentStore,
    R: RelationalStore,
{
    document: Arc<D>,
    relational: Arc<R>,
    read_cap: usize,
}

impl<D, R> MigrationDriver<D, R>
where
    D: DocumentStore,
    R: RelationalStore,
{
    pub fn new(document: Arc<D>, relational: Arc<R>, read_cap: usize) -> Self {
        Self {
            document,
            relational,
            read_cap,
        }
    }

    /// 先建表再迁移
    pub async fn init_and_migrate(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<MigrationReport> {
        self.relational.ensure_schema().await?;
        self.migrate_all(shutdown).await
    }

    /// 迁移全部集合
    #[instrument(skip(self, shutdown), fields(read_cap = self.read_cap))]
    pub async fn migrate_all(&self, shutdown: watch::Receiver<bool>) -> Result<MigrationReport> {
        let start = Instant::now();
        let mut report = MigrationReport::new();

        info!(collections = Collection::MIGRATION_ORDER.len(), "Starting migration");

        'collections: for collection in Collection::MIGRATION_ORDER {
            let mut summary = CollectionReport::default();

            let docs = match self.document.get_collection(collection, self.read_cap).await {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(
                        collection = %collection,
                        error = %e,
                        "Failed to read collection, skipping"
                    );
                    summary.read_error = Some(e.to_string());
                    report.per_collection.insert(collection, summary);
                    continue;
                }
            };
            summary.read = docs.len();

            for doc in docs {
                if *shutdown.borrow() {
                    report.cancelled = true;
                    record_migration(
                        collection.as_str(),
                        summary.migrated as u64,
                        summary.failed as u64,
                    );
                    report.per_collection.insert(collection, summary);
                    break 'collections;
                }

                let Some(id) = derive_id(&doc) else {
                    summary.skipped += 1;
                    continue;
                };

                match self.relational.upsert(collection, &id, &doc).await {
                    Ok(()) => summary.migrated += 1,
                    Err(e) => {
                        warn!(
                            collection = %collection,
                            id = %id,
                            error = %e,
                            "Failed to migrate record"
                        );
                        summary.failed += 1;
                        report.failures.push(MigrationFailure {
                            collection,
                            id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            info!(
                collection = %collection,
                read = summary.read,
                migrated = summary.migrated,
                skipped = summary.skipped,
                failed = summary.failed,
                "Collection migrated"
            );
            record_migration(collection.as_str(), summary.migrated as u64, summary.failed as u64);
            report.per_collection.insert(collection, summary);
        }

        report.migrated = report.per_collection.values().map(|c| c.migrated).sum();
        report.skipped = report.per_collection.values().map(|c| c.skipped).sum();
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        let status = if report.cancelled { "cancelled" } else { "completed" };
        record_migration_run(status, start.elapsed().as_secs_f64());
        info!(
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "Migration finished"
        );

        Ok(report)
    }
}

//! 存储运维服务
//!
//! 把建表、迁移与各类统计封装在 [`StorageAdmin`] 之后，handler 只依赖该接口。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hybrid_storage::{Collection, MigrationDriver, MigrationReport, Storage};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::dto::{DocumentStatsDto, MigrationStatusDto};
use crate::error::{AdminError, Result};

/// 存储运维接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageAdmin: Send + Sync {
    /// 建表后迁移
    async fn init_and_migrate(&self) -> Result<MigrationReport>;

    async fn migrate(&self) -> Result<MigrationReport>;

    async fn migration_status(&self) -> Result<MigrationStatusDto>;

    async fn table_counts(&self) -> Result<BTreeMap<Collection, i64>>;

    async fn document_stats(&self) -> Result<DocumentStatsDto>;

    /// 关系库是否可用
    async fn relational_ready(&self) -> bool;
}

/// 基于生产存储组合的实现
///
/// 同一实例同时只允许一个迁移任务；服务关闭信号会让进行中的迁移在当前记录后停止。
pub struct LiveStorageAdmin {
    storage: Arc<Storage>,
    read_cap: usize,
    shutdown: watch::Receiver<bool>,
    migration: tokio::sync::Mutex<()>,
    last_report: Mutex<Option<MigrationReport>>,
}

impl LiveStorageAdmin {
    pub fn new(storage: Arc<Storage>, read_cap: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            storage,
            read_cap,
            shutdown,
            migration: tokio::sync::Mutex::new(()),
            last_report: Mutex::new(None),
        }
    }

    async fn run_migration(&self, init_schema: bool) -> Result<MigrationReport> {
        let _running = self
            .migration
            .try_lock()
            .map_err(|_| AdminError::MigrationInProgress)?;

        let driver = MigrationDriver::new(
            Arc::clone(self.storage.document()),
            Arc::clone(self.storage.relational()),
            self.read_cap,
        );
        let shutdown = self.shutdown.clone();
        let report = if init_schema {
            driver.init_and_migrate(shutdown).await?
        } else {
            driver.migrate_all(shutdown).await?
        };

        if report.cancelled {
            warn!(migrated = report.migrated, "迁移被服务关闭中止");
        } else {
            info!(migrated = report.migrated, failed = report.failures.len(), "迁移完成");
        }
        *self.last_report.lock() = Some(report.clone());
        Ok(report)
    }
}

#[async_trait]
impl StorageAdmin for LiveStorageAdmin {
    #[instrument(skip(self))]
    async fn init_and_migrate(&self) -> Result<MigrationReport> {
        self.run_migration(true).await
    }

    #[instrument(skip(self))]
    async fn migrate(&self) -> Result<MigrationReport> {
        self.run_migration(false).await
    }

    async fn migration_status(&self) -> Result<MigrationStatusDto> {
        let tables = self.storage.relational().list_tables().await?;
        let running = self.migration.try_lock().is_err();
        let last_report = self.last_report.lock().clone();
        Ok(MigrationStatusDto::new(tables, running, last_report))
    }

    async fn table_counts(&self) -> Result<BTreeMap<Collection, i64>> {
        Ok(self.storage.relational().table_counts().await?)
    }

    async fn document_stats(&self) -> Result<DocumentStatsDto> {
        let document = self.storage.document();
        Ok(DocumentStatsDto {
            mode: document.mode(),
            collections: document.stats(),
            sync: self.storage.stats(),
        })
    }

    async fn relational_ready(&self) -> bool {
        self.storage.relational().health_check().await.is_ok()
    }
}

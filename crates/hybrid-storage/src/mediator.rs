//! 混合存储中介层
//!
//! 对调用方暴露一个逻辑存储，内部组合文档库（主）与关系库（二级）：
//!
//! - 写：两侧并发执行并全部完成后返回；任意一侧失败都会向调用方报错，成功的一侧不回滚
//! - 读：关系库优先，未命中或出错时回退文档库，命中后把记录回填到关系库
//! - 回填：失败只记录日志与计数，不影响读结果
//!
//! 两个存储之间没有跨库锁，同一记录的并发写入可能让两侧保留不同的最后写入者，
//! 直到下一次成功的写入或回填重新对齐。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join;
use loyalty_shared::config::{BackfillMode, StorageConfig};
use loyalty_shared::observability::metrics::{record_backfill, record_fallback_read};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::error::{Result, StorageError};
use crate::models::{Collection, FieldFilter, QueryOperator, Record, derive_id};
use crate::stats::{SyncStats, SyncStatsSnapshot};
use crate::traits::{DocumentStore, RelationalStore};

/// 中介层行为参数
#[derive(Debug, Clone, Copy)]
pub struct MediatorOptions {
    pub backfill_mode: BackfillMode,
    /// 写操作默认截止时间
    pub write_timeout: Option<Duration>,
    pub default_limit: usize,
}

impl Default for MediatorOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for MediatorOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            backfill_mode: config.backfill_mode,
            write_timeout: config.write_timeout_ms.map(Duration::from_millis),
            default_limit: config.default_limit,
        }
    }
}

/// 混合存储
pub struct HybridStorage<D, R>
where
    D: DocumentStore + 'static,
    R: RelationalStore + 'static,
{
    document: Arc<D>,
    relational: Arc<R>,
    options: MediatorOptions,
    stats: Arc<SyncStats>,
    backfills: Mutex<JoinSet<()>>,
}

impl<D, R> HybridStorage<D, R>
where
    D: DocumentStore + 'static,
    R: RelationalStore + 'static,
{
    pub fn new(document: Arc<D>, relational: Arc<R>, options: MediatorOptions) -> Self {
        Self {
            document,
            relational,
            options,
            stats: Arc::new(SyncStats::new()),
            backfills: Mutex::new(JoinSet::new()),
        }
    }

    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    pub fn relational(&self) -> &Arc<R> {
        &self.relational
    }

    pub fn options(&self) -> &MediatorOptions {
        &self.options
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }

    // ==================== 写 ====================

    /// 新增记录
    ///
    /// 标识按自然标识规则推导，推导不出时生成 UUID 并写入 `id` 字段。两侧使用同一个标识。
    pub async fn add(&self, collection: Collection, record: Record) -> Result<Record> {
        self.within("add", self.options.write_timeout, self.add_inner(collection, record))
            .await
    }

    pub async fn add_with_deadline(
        &self,
        collection: Collection,
        record: Record,
        deadline: Duration,
    ) -> Result<Record> {
        self.within("add", Some(deadline), self.add_inner(collection, record))
            .await
    }

    /// 按标识整体写入（幂等）
    pub async fn set(&self, collection: Collection, id: &str, record: Record) -> Result<Record> {
        self.within("set", self.options.write_timeout, self.set_inner(collection, id, record))
            .await
    }

    pub async fn set_with_deadline(
        &self,
        collection: Collection,
        id: &str,
        record: Record,
        deadline: Duration,
    ) -> Result<Record> {
        self.within("set", Some(deadline), self.set_inner(collection, id, record))
            .await
    }

    /// 合并部分字段；记录不存在时两侧都不做任何事
    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Record,
    ) -> Result<Record> {
        self.within(
            "update",
            self.options.write_timeout,
            self.update_inner(collection, id, partial),
        )
        .await
    }

    pub async fn update_with_deadline(
        &self,
        collection: Collection,
        id: &str,
        partial: Record,
        deadline: Duration,
    ) -> Result<Record> {
        self.within("update", Some(deadline), self.update_inner(collection, id, partial))
            .await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.within("delete", self.options.write_timeout, self.delete_inner(collection, id))
            .await
    }

    pub async fn delete_with_deadline(
        &self,
        collection: Collection,
        id: &str,
        deadline: Duration,
    ) -> Result<()> {
        self.within("delete", Some(deadline), self.delete_inner(collection, id))
            .await
    }

    #[instrument(skip(self, record), fields(collection = %collection))]
    async fn add_inner(&self, collection: Collection, record: Record) -> Result<Record> {
        let id = derive_id(&record).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record = record.with_id(&id);

        let (document, relational) = join(
            self.document.create(collection, Some(id.clone()), &record),
            self.relational.insert(collection, &id, &record),
        )
        .await;

        dual_write_result("add", collection, &id, document.map(|_| ()), relational)?;
        Ok(record)
    }

    #[instrument(skip(self, record), fields(collection = %collection))]
    async fn set_inner(&self, collection: Collection, id: &str, record: Record) -> Result<Record> {
        let record = record.with_id(id);
        let (document, relational) = join(
            self.document.set(collection, id, &record),
            self.relational.upsert(collection, id, &record),
        )
        .await;

        dual_write_result("set", collection, id, document, relational)?;
        Ok(record)
    }

    #[instrument(skip(self, partial), fields(collection = %collection))]
    async fn update_inner(
        &self,
        collection: Collection,
        id: &str,
        partial: Record,
    ) -> Result<Record> {
        let (document, relational) = join(
            self.document.update(collection, id, &partial),
            self.relational.update(collection, id, &partial),
        )
        .await;

        dual_write_result("update", collection, id, document, relational)?;
        Ok(partial.with_id(id))
    }

    #[instrument(skip(self), fields(collection = %collection))]
    async fn delete_inner(&self, collection: Collection, id: &str) -> Result<()> {
        let (document, relational) = join(
            self.document.delete(collection, id),
            self.relational.delete(collection, id),
        )
        .await;

        dual_write_result("delete", collection, id, document, relational)
    }

    /// 截止时间到达时丢弃整个（已合并的）双写 future，两侧一起中止
    async fn within<T, F>(
        &self,
        operation: &'static str,
        deadline: Option<Duration>,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(deadline) = deadline else {
            return fut.await;
        };
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = deadline.as_millis() as u64;
                warn!(operation, timeout_ms, "Dual write deadline exceeded");
                Err(StorageError::DeadlineExceeded {
                    operation,
                    timeout_ms,
                })
            }
        }
    }

    // ==================== 读 ====================

    /// 按标识读取
    ///
    /// 关系库命中直接返回，不访问文档库。两侧都未命中返回 `Ok(None)`。
    #[instrument(skip(self), fields(collection = %collection))]
    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        match self.relational.get(collection, id).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => self.relational_read_failed("get", collection, &e),
        }

        let record = self.document.get(collection, id).await?;
        if let Some(record) = &record {
            self.fallback_read("get", collection);
            self.backfill(collection, id.to_string(), record.clone()).await;
        }
        Ok(record)
    }

    /// 按标识读取，不存在时返回 `NotFound`
    pub async fn require(&self, collection: Collection, id: &str) -> Result<Record> {
        self.get(collection, id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    /// 批量读取
    ///
    /// 关系库非空时直接返回；否则从文档库读取并逐条回填。`limit` 为空时使用默认上限。
    #[instrument(skip(self), fields(collection = %collection))]
    pub async fn get_collection(
        &self,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let limit = limit.unwrap_or(self.options.default_limit);
        match self.relational.get_all(collection, limit).await {
            Ok(records) if !records.is_empty() => return Ok(records),
            Ok(_) => {}
            Err(e) => self.relational_read_failed("get_collection", collection, &e),
        }

        let records = self.document.get_collection(collection, limit).await?;
        if !records.is_empty() {
            self.fallback_read("get_collection", collection);
            self.backfill_all(collection, &records).await;
        }
        Ok(records)
    }

    /// 单字段比较查询
    pub async fn query_collection(
        &self,
        collection: Collection,
        field: &str,
        op: QueryOperator,
        value: Value,
    ) -> Result<Vec<Record>> {
        self.query(collection, &FieldFilter::new(field, op, value))
            .await
    }

    #[instrument(skip(self), fields(collection = %collection, field = %filter.field, op = %filter.op))]
    pub async fn query(&self, collection: Collection, filter: &FieldFilter) -> Result<Vec<Record>> {
        match self.relational.query(collection, filter).await {
            Ok(records) if !records.is_empty() => return Ok(records),
            Ok(_) => {}
            Err(e) => self.relational_read_failed("query", collection, &e),
        }

        let records = self.document.query(collection, filter).await?;
        if !records.is_empty() {
            self.fallback_read("query", collection);
            self.backfill_all(collection, &records).await;
        }
        Ok(records)
    }

    fn relational_read_failed(&self, operation: &str, collection: Collection, err: &StorageError) {
        self.stats.relational_read_error();
        warn!(
            operation,
            collection = %collection,
            error = %err,
            "Relational read failed, falling back to document store"
        );
    }

    fn fallback_read(&self, operation: &str, collection: Collection) {
        self.stats.fallback_read();
        record_fallback_read(collection.as_str(), operation);
    }

    // ==================== 回填 ====================

    async fn backfill_all(&self, collection: Collection, records: &[Record]) {
        for record in records {
            match derive_id(record) {
                Some(id) => self.backfill(collection, id, record.clone()).await,
                None => debug!(collection = %collection, "Skipping backfill for record without id"),
            }
        }
    }

    async fn backfill(&self, collection: Collection, id: String, record: Record) {
        let relational = Arc::clone(&self.relational);
        let stats = Arc::clone(&self.stats);
        let task = run_backfill(relational, stats, collection, id, record);

        match self.options.backfill_mode {
            BackfillMode::Inline => task.await,
            BackfillMode::Detached => {
                let mut tasks = self.backfills.lock();
                // 顺手回收已完成的任务，避免集合无限增长
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
        }
    }

    /// 等待所有后台回填完成
    ///
    /// 后台回填随实例一起被中止，关闭前或测试中需要确定结果时调用。
    pub async fn flush_backfills(&self) {
        let mut tasks = std::mem::take(&mut *self.backfills.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Backfill task aborted");
            }
        }
    }
}

async fn run_backfill<R: RelationalStore>(
    relational: Arc<R>,
    stats: Arc<SyncStats>,
    collection: Collection,
    id: String,
    record: Record,
) {
    match relational.upsert(collection, &id, &record).await {
        Ok(()) => {
            stats.backfill_succeeded();
            record_backfill(collection.as_str(), "success");
            debug!(collection = %collection, id = %id, "Backfilled record into relational store");
        }
        Err(e) => {
            stats.backfill_failed();
            record_backfill(collection.as_str(), "failure");
            warn!(collection = %collection, id = %id, error = %e, "Backfill failed");
        }
    }
}

fn dual_write_result(
    operation: &'static str,
    collection: Collection,
    id: &str,
    document: Result<()>,
    relational: Result<()>,
) -> Result<()> {
    match StorageError::combine_legs(operation, collection, id, document, relational) {
        Some(err) => {
            warn!(operation, collection = %collection, id, error = %err, "Dual write failed");
            Err(err)
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockDocumentStore, MockRelationalStore};
    use mockall::predicate::eq;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).unwrap()
    }

    fn storage(
        document: MockDocumentStore,
        relational: MockRelationalStore,
        backfill_mode: BackfillMode,
    ) -> HybridStorage<MockDocumentStore, MockRelationalStore> {
        HybridStorage::new(
            Arc::new(document),
            Arc::new(relational),
            MediatorOptions {
                backfill_mode,
                ..MediatorOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_get_relational_hit_skips_document_store() {
        let mut relational = MockRelationalStore::new();
        relational
            .expect_get()
            .with(eq(Collection::Vendors), eq("v-1"))
            .times(1)
            .returning(|_, _| Ok(Some(Record::new().with_id("v-1"))));

        let mut document = MockDocumentStore::new();
        document.expect_get().never();

        let storage = storage(document, relational, BackfillMode::Inline);
        let found = storage.get(Collection::Vendors, "v-1").await.unwrap();
        assert!(found.is_some());
        assert_eq!(storage.stats().document_fallback_reads, 0);
    }

    #[tokio::test]
    async fn test_get_falls_back_and_backfills() {
        let mut relational = MockRelationalStore::new();
        relational.expect_get().times(1).returning(|_, _| Ok(None));
        relational
            .expect_upsert()
            .withf(|c, id, r| {
                *c == Collection::Offers && id == "o-1" && r.get("title") == Some(&json!("BOGO"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut document = MockDocumentStore::new();
        document
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(Some(record(json!({"id": "o-1", "title": "BOGO"})))));

        let storage = storage(document, relational, BackfillMode::Inline);
        let found = storage.get(Collection::Offers, "o-1").await.unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&json!("BOGO")));

        let stats = storage.stats();
        assert_eq!(stats.document_fallback_reads, 1);
        assert_eq!(stats.backfill_succeeded, 1);
    }

    #[tokio::test]
    async fn test_get_relational_error_is_not_surfaced() {
        let mut relational = MockRelationalStore::new();
        relational
            .expect_get()
            .returning(|_, _| Err(StorageError::Relational(sqlx::Error::PoolTimedOut)));
        relational
            .expect_upsert()
            .returning(|_, _, _| Err(StorageError::Relational(sqlx::Error::PoolTimedOut)));

        let mut document = MockDocumentStore::new();
        document
            .expect_get()
            .returning(|_, _| Ok(Some(record(json!({"id": "c-1"})))));

        let storage = storage(document, relational, BackfillMode::Inline);
        let found = storage.get(Collection::Customers, "c-1").await.unwrap();
        assert!(found.is_some());

        let stats = storage.stats();
        assert_eq!(stats.relational_read_errors, 1);
        assert_eq!(stats.backfill_failed, 1);
    }

    #[tokio::test]
    async fn test_get_document_error_propagates() {
        let mut relational = MockRelationalStore::new();
        relational.expect_get().returning(|_, _| Ok(None));
        let mut document = MockDocumentStore::new();
        document
            .expect_get()
            .returning(|_, _| Err(StorageError::Document("unavailable".into())));

        let storage = storage(document, relational, BackfillMode::Inline);
        let err = storage.get(Collection::Vendors, "v-1").await.unwrap_err();
        assert!(matches!(err, StorageError::Document(_)));
    }

    #[tokio::test]
    async fn test_require_maps_miss_to_not_found() {
        let mut relational = MockRelationalStore::new();
        relational.expect_get().returning(|_, _| Ok(None));
        let mut document = MockDocumentStore::new();
        document.expect_get().returning(|_, _| Ok(None));

        let storage = storage(document, relational, BackfillMode::Inline);
        let err = storage.require(Collection::Redemptions, "r-404").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id, .. } if id == "r-404"));
    }

    #[tokio::test]
    async fn test_add_uses_same_id_on_both_stores() {
        let mut document = MockDocumentStore::new();
        document
            .expect_create()
            .withf(|_, id, _| id.as_deref() == Some("owner@shop.test"))
            .times(1)
            .returning(|_, id, _| Ok(id.unwrap_or_default()));

        let mut relational = MockRelationalStore::new();
        relational
            .expect_insert()
            .withf(|_, id, r| {
                id == "owner@shop.test" && r.get("id") == Some(&json!("owner@shop.test"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let storage = storage(document, relational, BackfillMode::Inline);
        let added = storage
            .add(Collection::Vendors, record(json!({"email": "owner@shop.test", "name": "Shop"})))
            .await
            .unwrap();
        assert_eq!(added.get("id"), Some(&json!("owner@shop.test")));
    }

    #[tokio::test]
    async fn test_set_reports_failing_leg() {
        let mut document = MockDocumentStore::new();
        document.expect_set().returning(|_, _, _| Ok(()));
        let mut relational = MockRelationalStore::new();
        relational
            .expect_upsert()
            .returning(|_, _, _| Err(StorageError::Relational(sqlx::Error::PoolTimedOut)));

        let storage = storage(document, relational, BackfillMode::Inline);
        let err = storage
            .set(Collection::Offers, "o-1", record(json!({"title": "A"})))
            .await
            .unwrap_err();

        assert!(err.relational_failed());
        assert!(!err.document_failed());
    }

    #[tokio::test]
    async fn test_query_collection_backfills_each_record() {
        let mut relational = MockRelationalStore::new();
        relational.expect_query().returning(|_, _| Ok(vec![]));
        relational.expect_upsert().times(2).returning(|_, _, _| Ok(()));

        let mut document = MockDocumentStore::new();
        document.expect_query().returning(|_, _| {
            Ok(vec![
                record(json!({"id": "q-1", "status": "unclaimed"})),
                record(json!({"id": "q-2", "status": "unclaimed"})),
                // 没有标识的记录不回填
                record(json!({"status": "unclaimed"})),
            ])
        });

        let storage = storage(document, relational, BackfillMode::Detached);
        let found = storage
            .query_collection(Collection::QrTokens, "status", QueryOperator::Eq, json!("unclaimed"))
            .await
            .unwrap();
        assert_eq!(found.len(), 3);

        storage.flush_backfills().await;
        assert_eq!(storage.stats().backfill_succeeded, 2);
    }
}

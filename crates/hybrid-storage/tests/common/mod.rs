//! 集成测试共用的存储替身
//!
//! 关系库替身用 DashMap 保存整行；文档库替身包装内存模式的适配器，并支持模拟不可达。

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hybrid_storage::{
    Collection, DocumentStore, DocumentStoreAdapter, FieldFilter, HybridStorage, MediatorOptions,
    Record, RelationalStore, Result, StorageError,
};
use loyalty_shared::config::{BackfillMode, DegradedQueryPolicy};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

pub fn record(value: Value) -> Record {
    Record::from_json(value).expect("test record must be an object")
}

// ==================== 关系库替身 ====================

#[derive(Default)]
pub struct FakeRelationalStore {
    rows: DashMap<(Collection, String), Record>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    /// 每次 upsert 前等待的时长
    pub upsert_delay: Mutex<Option<Duration>>,
    /// 第一次 upsert 在此闸门上等待，用于构造确定的交错
    upsert_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub get_calls: AtomicUsize,
}

impl FakeRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, collection: Collection, id: &str) -> Option<Record> {
        self.rows
            .get(&(collection, id.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.rows.iter().filter(|e| e.key().0 == collection).count()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 安装闸门，返回放行用的发送端
    pub fn gate_next_upsert(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.upsert_gate.lock() = Some(rx);
        tx
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Relational(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Relational(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn sorted(&self, collection: Collection, filter: Option<&FieldFilter>) -> Vec<Record> {
        let mut rows: Vec<(String, Record)> = self
            .rows
            .iter()
            .filter(|e| e.key().0 == collection)
            .filter(|e| filter.is_none_or(|f| f.matches(e.value())))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows.into_iter().map(|(_, r)| r).collect()
    }
}

#[async_trait]
impl RelationalStore for FakeRelationalStore {
    async fn insert(&self, collection: Collection, id: &str, record: &Record) -> Result<()> {
        self.check_write()?;
        let key = (collection, id.to_string());
        if self.rows.contains_key(&key) {
            return Err(StorageError::Internal(format!("duplicate key {id}")));
        }
        self.rows.insert(key, record.clone().with_id(id));
        Ok(())
    }

    async fn upsert(&self, collection: Collection, id: &str, record: &Record) -> Result<()> {
        let gate = self.upsert_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let delay = *self.upsert_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        self.rows
            .insert((collection, id.to_string()), record.clone().with_id(id));
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        Ok(self.row(collection, id))
    }

    async fn get_all(&self, collection: Collection, limit: usize) -> Result<Vec<Record>> {
        self.check_read()?;
        Ok(self.sorted(collection, None).into_iter().take(limit).collect())
    }

    async fn query(&self, collection: Collection, filter: &FieldFilter) -> Result<Vec<Record>> {
        self.check_read()?;
        Ok(self.sorted(collection, Some(filter)))
    }

    async fn update(&self, collection: Collection, id: &str, partial: &Record) -> Result<()> {
        self.check_write()?;
        if let Some(mut row) = self.rows.get_mut(&(collection, id.to_string())) {
            row.merge(partial);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check_write()?;
        self.rows.remove(&(collection, id.to_string()));
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }
}

// ==================== 文档库替身 ====================

pub struct FlakyDocumentStore {
    inner: DocumentStoreAdapter,
    pub unreachable: AtomicBool,
    pub get_calls: AtomicUsize,
}

impl FlakyDocumentStore {
    pub fn new(policy: DegradedQueryPolicy) -> Self {
        Self {
            inner: DocumentStoreAdapter::in_memory(policy),
            unreachable: AtomicBool::new(false),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// 绕过不可达开关直接读取内部存储
    pub async fn peek(&self, collection: Collection, id: &str) -> Option<Record> {
        self.inner.get(collection, id).await.ok().flatten()
    }

    fn check(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StorageError::Document("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn create(
        &self,
        collection: Collection,
        id: Option<String>,
        record: &Record,
    ) -> Result<String> {
        self.check()?;
        self.inner.create(collection, id, record).await
    }

    async fn set(&self, collection: Collection, id: &str, record: &Record) -> Result<()> {
        self.check()?;
        self.inner.set(collection, id, record).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(collection, id).await
    }

    async fn get_collection(&self, collection: Collection, limit: usize) -> Result<Vec<Record>> {
        self.check()?;
        self.inner.get_collection(collection, limit).await
    }

    async fn query(&self, collection: Collection, filter: &FieldFilter) -> Result<Vec<Record>> {
        self.check()?;
        self.inner.query(collection, filter).await
    }

    async fn update(&self, collection: Collection, id: &str, partial: &Record) -> Result<()> {
        self.check()?;
        self.inner.update(collection, id, partial).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(collection, id).await
    }
}

// ==================== 组装 ====================

pub struct Harness {
    pub document: Arc<FlakyDocumentStore>,
    pub relational: Arc<FakeRelationalStore>,
    pub storage: Arc<HybridStorage<FlakyDocumentStore, FakeRelationalStore>>,
}

pub fn harness(backfill_mode: BackfillMode) -> Harness {
    harness_with(backfill_mode, DegradedQueryPolicy::EqualityOnly)
}

pub fn harness_with(backfill_mode: BackfillMode, policy: DegradedQueryPolicy) -> Harness {
    let document = Arc::new(FlakyDocumentStore::new(policy));
    let relational = Arc::new(FakeRelationalStore::new());
    let storage = Arc::new(HybridStorage::new(
        Arc::clone(&document),
        Arc::clone(&relational),
        MediatorOptions {
            backfill_mode,
            ..MediatorOptions::default()
        },
    ));
    Harness {
        document,
        relational,
        storage,
    }
}

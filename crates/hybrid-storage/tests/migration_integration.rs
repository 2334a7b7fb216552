//! 迁移驱动集成测试
//!
//! 文档库使用内存模式适配器，关系库使用替身，验证迁移可重复执行、跳过无标识记录与中途取消。

mod common;

use std::sync::Arc;

use common::{FakeRelationalStore, record};
use hybrid_storage::{Collection, DocumentStore, DocumentStoreAdapter, MigrationDriver};
use loyalty_shared::config::DegradedQueryPolicy;
use serde_json::json;
use tokio::sync::watch;

async fn seeded_document() -> Arc<DocumentStoreAdapter> {
    let document = Arc::new(DocumentStoreAdapter::in_memory(DegradedQueryPolicy::EqualityOnly));
    document
        .set(Collection::QrTokens, "tok-1", &record(json!({"token": "tok-1", "vendor_id": "v-1"})))
        .await
        .unwrap();
    document
        .set(Collection::Vendors, "v-1", &record(json!({"name": "Blue Cafe"})))
        .await
        .unwrap();
    document
        .set(Collection::Vendors, "v-2", &record(json!({"name": "Deli"})))
        .await
        .unwrap();
    document
        .set(Collection::Offers, "o-1", &record(json!({"vendor_id": "v-1", "title": "2 for 1"})))
        .await
        .unwrap();
    document
}

#[tokio::test]
async fn test_migration_is_idempotent() {
    let document = seeded_document().await;
    let relational = Arc::new(FakeRelationalStore::new());
    let driver = MigrationDriver::new(document, Arc::clone(&relational), 10_000);

    let (_tx, rx) = watch::channel(false);
    let first = driver.migrate_all(rx.clone()).await.unwrap();
    let second = driver.migrate_all(rx).await.unwrap();

    assert_eq!(first.migrated, 4);
    assert_eq!(second.migrated, 4);
    assert!(first.failures.is_empty());
    assert!(!first.cancelled);
    assert_eq!(relational.len(Collection::Vendors), 2);
    assert_eq!(relational.len(Collection::QrTokens), 1);
    assert_eq!(relational.len(Collection::Offers), 1);
    assert_eq!(first.per_collection.len(), Collection::ALL.len());
    assert_eq!(
        relational.row(Collection::Vendors, "v-1"),
        Some(record(json!({"id": "v-1", "name": "Blue Cafe"})))
    );
}

#[tokio::test]
async fn test_migration_records_failures_and_continues() {
    let document = seeded_document().await;
    let relational = Arc::new(FakeRelationalStore::new());
    relational.set_fail_writes(true);
    let driver = MigrationDriver::new(document, Arc::clone(&relational), 10_000);

    let (_tx, rx) = watch::channel(false);
    let report = driver.migrate_all(rx).await.unwrap();

    assert_eq!(report.migrated, 0);
    assert_eq!(report.failures.len(), 4);
    assert_eq!(report.per_collection[&Collection::Vendors].failed, 2);
    assert!(report.failures.iter().any(|f| f.id == "tok-1"));
}

#[tokio::test]
async fn test_migration_read_cap_limits_each_collection() {
    let document = seeded_document().await;
    let relational = Arc::new(FakeRelationalStore::new());
    let driver = MigrationDriver::new(document, Arc::clone(&relational), 1);

    let (_tx, rx) = watch::channel(false);
    let report = driver.migrate_all(rx).await.unwrap();

    assert_eq!(report.per_collection[&Collection::Vendors].read, 1);
    assert_eq!(relational.len(Collection::Vendors), 1);
    assert_eq!(report.migrated, 3);
}

#[tokio::test]
async fn test_migration_cancelled_before_start_writes_nothing() {
    let document = seeded_document().await;
    let relational = Arc::new(FakeRelationalStore::new());
    let driver = MigrationDriver::new(document, Arc::clone(&relational), 10_000);

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let report = driver.init_and_migrate(rx).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.migrated, 0);
    assert_eq!(relational.len(Collection::QrTokens), 0);
    // 停在第一个有数据的集合上
    assert_eq!(report.per_collection.len(), 1);
    assert!(report.per_collection.contains_key(&Collection::QrTokens));
}

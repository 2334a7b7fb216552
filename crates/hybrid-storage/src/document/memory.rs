//! 内存文档存储
//!
//! 使用 DashMap 实现，按集合分桶。由文档库适配器实例持有，不同实例之间互不共享数据。

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::models::{Collection, Record};

/// 内存文档存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, DashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖文档
    pub fn insert(&self, collection: Collection, id: &str, record: Record) {
        self.collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), record);
    }

    /// 获取文档的克隆，不持有锁
    pub fn get(&self, collection: Collection, id: &str) -> Option<Record> {
        let docs = self.collections.get(&collection)?;
        let doc = docs.get(id)?.value().clone();
        Some(doc)
    }

    /// 浅合并到已有文档，文档不存在时返回 false
    pub fn merge(&self, collection: Collection, id: &str, partial: &Record) -> bool {
        let Some(docs) = self.collections.get(&collection) else {
            return false;
        };
        let Some(mut doc) = docs.get_mut(id) else {
            return false;
        };
        doc.merge(partial);
        true
    }

    pub fn remove(&self, collection: Collection, id: &str) -> Option<Record> {
        let docs = self.collections.get(&collection)?;
        let (_, doc) = docs.remove(id)?;
        Some(doc)
    }

    /// 按标识排序后返回满足条件的前 `limit` 条
    pub fn list_by<F>(&self, collection: Collection, limit: usize, predicate: F) -> Vec<Record>
    where
        F: Fn(&Record) -> bool,
    {
        let Some(docs) = self.collections.get(&collection) else {
            return Vec::new();
        };
        let mut matched: Vec<(String, Record)> = docs
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        matched.into_iter().take(limit).map(|(_, doc)| doc).collect()
    }

    pub fn clear(&self, collection: Collection) {
        self.collections.remove(&collection);
    }

    pub fn clear_all(&self) {
        self.collections.clear();
    }

    /// 各集合文档数
    pub fn counts(&self) -> BTreeMap<Collection, usize> {
        self.collections
            .iter()
            .map(|entry| (*entry.key(), entry.value().len()))
            .collect()
    }
}

//! 记录与自然标识
//!
//! 记录是字段名到 JSON 值的映射。两个存储必须用同一个派生标识存放同一条逻辑记录，
//! 因此标识推导只在 [`derive_id`] 一处实现，所有写路径、回填与迁移都调用它。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StorageError};

/// 标识字段优先级
pub const ID_PRECEDENCE: [&str; 5] = ["id", "token", "vendor_id", "email", "phone_number"];

/// 标识字段名
pub const ID_FIELD: &str = "id";

/// 记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// 从任意 JSON 值构造，只接受对象
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StorageError::InvalidRecord(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// 写入 `id` 字段并返回自身
    pub fn with_id(mut self, id: &str) -> Self {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self
    }

    /// 浅合并：`other` 中的字段覆盖当前字段
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in other.iter() {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// 派生自然标识，见 [`derive_id`]
    pub fn derive_id(&self) -> Option<String> {
        derive_id(self)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = StorageError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(value)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 按固定优先级 `id` → `token` → `vendor_id` → `email` → `phone_number` 推导记录标识
///
/// 非空字符串与数字可作为标识；null、空字符串、布尔、数组、对象会被跳过，继续看下一个候选字段。
pub fn derive_id(record: &Record) -> Option<String> {
    ID_PRECEDENCE
        .iter()
        .filter_map(|field| record.get(field))
        .find_map(id_candidate)
}

fn id_candidate(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

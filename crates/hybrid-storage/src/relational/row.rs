//! 记录与行之间的映射
//!
//! 写入时把记录投影到类型列，无法落入类型列的字段（未声明的字段，或类型对不上的值）进入 `metadata`；
//! 读取时以 `metadata` 为底，叠加非空类型列，最后写入 `id`。

use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use super::schema::{ColumnType, METADATA_COLUMN, TableSchema};
use crate::error::Result;
use crate::models::{ID_FIELD, Record};

/// 类型列的取值
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Json(Value),
    /// 带类型的 NULL，Postgres 需要参数类型与列类型一致
    Null(ColumnType),
}

impl ColumnValue {
    /// 将 JSON 值转换为列类型，类型不兼容时返回 None
    pub fn coerce(ty: ColumnType, value: &Value) -> Option<Self> {
        match (ty, value) {
            (_, Value::Null) => Some(Self::Null(ty)),
            (ColumnType::Text, Value::String(s)) => Some(Self::Text(s.clone())),
            (ColumnType::Boolean, Value::Bool(b)) => Some(Self::Bool(*b)),
            (ColumnType::BigInt, Value::Number(n)) => n.as_i64().map(Self::BigInt),
            (ColumnType::Double, Value::Number(n)) => n.as_f64().map(Self::Double),
            (ColumnType::Json, v) => Some(Self::Json(v.clone())),
            _ => None,
        }
    }

    /// 追加一个绑定参数
    pub fn push_bind(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::Text(v) => builder.push_bind(v),
            Self::Bool(v) => builder.push_bind(v),
            Self::BigInt(v) => builder.push_bind(v),
            Self::Double(v) => builder.push_bind(v),
            Self::Json(v) => builder.push_bind(sqlx::types::Json(v)),
            Self::Null(ColumnType::Text) => builder.push_bind(None::<String>),
            Self::Null(ColumnType::Boolean) => builder.push_bind(None::<bool>),
            Self::Null(ColumnType::BigInt) => builder.push_bind(None::<i64>),
            Self::Null(ColumnType::Double) => builder.push_bind(None::<f64>),
            Self::Null(ColumnType::Json) => builder.push_bind(None::<sqlx::types::Json<Value>>),
        };
    }
}

/// 记录在某张表上的投影
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowProjection {
    pub columns: Vec<(&'static str, ColumnValue)>,
    pub metadata: Map<String, Value>,
    /// 记录中出现的全部字段名（不含 `id`），部分更新时用于清理 `metadata` 中的旧值
    pub fields: Vec<String>,
}

impl RowProjection {
    pub fn project(schema: &TableSchema, record: &Record) -> Self {
        let mut projection = Self::default();
        for (field, value) in record.iter() {
            if field == ID_FIELD {
                continue;
            }
            projection.fields.push(field.clone());

            let Some(column) = schema.column(field) else {
                projection.metadata.insert(field.clone(), value.clone());
                continue;
            };
            match ColumnValue::coerce(column.ty, value) {
                Some(ColumnValue::Null(ty)) => {
                    // 显式 null 也保留在 metadata 中，读回时字段仍然存在
                    projection.columns.push((column.name, ColumnValue::Null(ty)));
                    projection.metadata.insert(field.clone(), Value::Null);
                }
                Some(coerced) => projection.columns.push((column.name, coerced)),
                None => {
                    projection.columns.push((column.name, ColumnValue::Null(column.ty)));
                    projection.metadata.insert(field.clone(), value.clone());
                }
            }
        }
        projection
    }
}

/// 由一行重建记录
pub fn record_from_row(schema: &TableSchema, row: &PgRow) -> Result<Record> {
    let mut record = match row.try_get::<Option<Value>, _>(METADATA_COLUMN)? {
        Some(Value::Object(map)) => Record::from(map),
        _ => Record::new(),
    };

    for column in schema.columns {
        let value = match column.ty {
            ColumnType::Text => row
                .try_get::<Option<String>, _>(column.name)?
                .map(Value::String),
            ColumnType::Boolean => row.try_get::<Option<bool>, _>(column.name)?.map(Value::Bool),
            ColumnType::BigInt => row.try_get::<Option<i64>, _>(column.name)?.map(Value::from),
            ColumnType::Double => row
                .try_get::<Option<f64>, _>(column.name)?
                .and_then(double_to_json),
            ColumnType::Json => row
                .try_get::<Option<Value>, _>(column.name)?
                .filter(|v| !v.is_null()),
        };
        if let Some(value) = value {
            record.insert(column.name, value);
        }
    }

    let id: String = row.try_get(ID_FIELD)?;
    Ok(record.with_id(&id))
}

// 整数值的浮点列读回为整数，与写入时的 JSON 表示保持一致
fn double_to_json(value: f64) -> Option<Value> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(value as i64));
    }
    Number::from_f64(value).map(Value::Number)
}

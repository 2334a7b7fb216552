//! SQL 语句构造
//!
//! 所有值都以绑定参数传入，字段名只会以加引号的标识符（类型列）或绑定参数（metadata 键）出现。

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use super::row::{ColumnValue, RowProjection};
use super::schema::{ColumnType, METADATA_COLUMN, TableSchema, quote_ident};
use crate::models::{FieldFilter, ID_FIELD, QueryOperator, json_type_name};

pub fn select_by_id(schema: &TableSchema, id: &str) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT * FROM {} WHERE {} = ",
        quote_ident(schema.table()),
        quote_ident(ID_FIELD)
    ));
    builder.push_bind(id.to_string());
    builder
}

pub fn select_all(schema: &TableSchema, limit: usize) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT * FROM {} ORDER BY {} LIMIT ",
        quote_ident(schema.table()),
        quote_ident(ID_FIELD)
    ));
    builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    builder
}

pub fn delete_by_id(schema: &TableSchema, id: &str) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE {} = ",
        quote_ident(schema.table()),
        quote_ident(ID_FIELD)
    ));
    builder.push_bind(id.to_string());
    builder
}

pub fn count(schema: &TableSchema) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(schema.table()))
}

/// `INSERT`，只写记录中出现的类型列，其余列取默认值
pub fn insert(
    schema: &TableSchema,
    id: &str,
    projection: RowProjection,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(schema.table())));
    builder.push(quote_ident(ID_FIELD));
    for (name, _) in &projection.columns {
        builder.push(", ").push(quote_ident(name));
    }
    builder.push(", ").push(quote_ident(METADATA_COLUMN));

    builder.push(") VALUES (");
    builder.push_bind(id.to_string());
    for (_, value) in projection.columns {
        builder.push(", ");
        value.push_bind(&mut builder);
    }
    builder.push(", ");
    builder.push_bind(sqlx::types::Json(Value::Object(projection.metadata)));
    builder.push(")");
    builder
}

/// 整行覆盖：冲突时所有类型列与 metadata 都取本次写入的值（未出现的列回到默认值）
pub fn upsert(
    schema: &TableSchema,
    id: &str,
    projection: RowProjection,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = insert(schema, id, projection);
    builder.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", quote_ident(ID_FIELD)));
    let assignments: Vec<String> = schema
        .columns
        .iter()
        .map(|c| c.name)
        .chain(std::iter::once(METADATA_COLUMN))
        .map(|name| {
            let ident = quote_ident(name);
            format!("{ident} = EXCLUDED.{ident}")
        })
        .collect();
    builder.push(assignments.join(", "));
    builder
}

/// 部分更新：只写出现的类型列；metadata 先去掉本次出现的键再合并新值
pub fn update(
    schema: &TableSchema,
    id: &str,
    projection: RowProjection,
) -> QueryBuilder<'static, Postgres> {
    let metadata = quote_ident(METADATA_COLUMN);
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(schema.table())));
    for (name, value) in projection.columns {
        builder.push(quote_ident(name)).push(" = ");
        value.push_bind(&mut builder);
        builder.push(", ");
    }
    builder.push(format!("{metadata} = (COALESCE({metadata}, '{{}}'::jsonb) - "));
    builder.push_bind(projection.fields);
    builder.push("::text[]) || ");
    builder.push_bind(sqlx::types::Json(Value::Object(projection.metadata)));
    builder.push(format!(" WHERE {} = ", quote_ident(ID_FIELD)));
    builder.push_bind(id.to_string());
    builder
}

/// 单字段比较查询
///
/// 类型列且值可转换时使用原生列比较；否则退回到 `metadata -> field` 的 JSONB 比较。
/// 缺失字段不等于任何值，因此 `!=` 使用 `IS DISTINCT FROM`。
pub fn query(schema: &TableSchema, filter: &FieldFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT * FROM {} WHERE ",
        quote_ident(schema.table())
    ));

    let column_type = if filter.field == ID_FIELD {
        Some(ColumnType::Text)
    } else {
        schema.column(&filter.field).map(|c| c.ty)
    };

    match column_type {
        Some(ColumnType::Json) => {
            push_jsonb_predicate(&mut builder, &quote_ident(&filter.field), None, filter);
        }
        Some(ty) => match column_predicate_value(ty, &filter.value) {
            Some((value, cast)) => {
                push_column_predicate(&mut builder, &filter.field, ty, cast, filter.op, value);
            }
            None => push_metadata_predicate(&mut builder, filter),
        },
        None => push_metadata_predicate(&mut builder, filter),
    }

    builder.push(format!(" ORDER BY {}", quote_ident(ID_FIELD)));
    builder
}

// 查询时允许整数列与小数比较：此时把列提升为双精度
fn column_predicate_value(ty: ColumnType, value: &Value) -> Option<(ColumnValue, bool)> {
    if value.is_null() {
        return None;
    }
    match (ty, value) {
        (ColumnType::BigInt, Value::Number(n)) if n.as_i64().is_none() => {
            n.as_f64().map(|f| (ColumnValue::Double(f), true))
        }
        _ => ColumnValue::coerce(ty, value).map(|v| (v, false)),
    }
}

fn push_column_predicate(
    builder: &mut QueryBuilder<'static, Postgres>,
    field: &str,
    ty: ColumnType,
    cast_to_double: bool,
    op: QueryOperator,
    value: ColumnValue,
) {
    let mut column = quote_ident(field);
    if cast_to_double {
        column = format!("{column}::DOUBLE PRECISION");
    }
    // 字符串按字节序比较，与内存求值一致
    if ty == ColumnType::Text && is_ordering(op) {
        column = format!("{column} COLLATE \"C\"");
    }

    builder.push(column);
    match op {
        QueryOperator::Neq => builder.push(" IS DISTINCT FROM "),
        other => builder.push(format!(" {} ", other.sql())),
    };
    value.push_bind(builder);
}

fn push_metadata_predicate(builder: &mut QueryBuilder<'static, Postgres>, filter: &FieldFilter) {
    let metadata = quote_ident(METADATA_COLUMN);
    push_jsonb_predicate(builder, &metadata, Some(&filter.field), filter);
}

/// `target` 为 JSONB 表达式；`key` 存在时比较 `target -> key`
fn push_jsonb_predicate(
    builder: &mut QueryBuilder<'static, Postgres>,
    target: &str,
    key: Option<&str>,
    filter: &FieldFilter,
) {
    let push_expr = |builder: &mut QueryBuilder<'static, Postgres>| {
        builder.push("(").push(target);
        if let Some(key) = key {
            builder.push(" -> ");
            builder.push_bind(key.to_string());
        }
        builder.push(")");
    };

    match filter.op {
        QueryOperator::Eq => {
            push_expr(builder);
            builder.push(" = ");
            builder.push_bind(sqlx::types::Json(filter.value.clone()));
        }
        QueryOperator::Neq => {
            push_expr(builder);
            builder.push(" IS DISTINCT FROM ");
            builder.push_bind(sqlx::types::Json(filter.value.clone()));
        }
        op => {
            // JSONB 跨类型也有序，这里限定同类型标量，与内存求值一致
            let type_name = json_type_name(&filter.value);
            if !matches!(type_name, "number" | "string" | "boolean") {
                builder.push("FALSE");
                return;
            }
            builder.push("jsonb_typeof");
            push_expr(builder);
            builder.push(" = ");
            builder.push_bind(type_name.to_string());
            builder.push(" AND ");
            match &filter.value {
                // 字符串取文本后按字节序比较
                Value::String(text) => {
                    builder.push("(").push(target);
                    match key {
                        Some(key) => {
                            builder.push(" ->> ");
                            builder.push_bind(key.to_string());
                        }
                        None => {
                            builder.push(" #>> '{}'");
                        }
                    }
                    builder.push(format!(") COLLATE \"C\" {} ", op.sql()));
                    builder.push_bind(text.clone());
                }
                value => {
                    push_expr(builder);
                    builder.push(format!(" {} ", op.sql()));
                    builder.push_bind(sqlx::types::Json(value.clone()));
                }
            }
        }
    }
}

fn is_ordering(op: QueryOperator) -> bool {
    !matches!(op, QueryOperator::Eq | QueryOperator::Neq)
}

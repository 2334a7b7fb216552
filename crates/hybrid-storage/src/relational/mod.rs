//! 关系库适配器（PostgreSQL）
//!
//! - `schema`: 每个集合的表结构与 DDL
//! - `row`: 记录与行的互相转换
//! - `sql`: 语句构造
//! - `store`: 基于连接池的 [`RelationalStore`](crate::traits::RelationalStore) 实现

pub mod row;
pub mod schema;
pub mod sql;
mod store;

pub use schema::{ColumnType, TableSchema, schema_for};
pub use store::PgRelationalStore;

//! 领域模型
//!
//! - `collection`: 固定的集合词表
//! - `record`: 记录与自然标识推导
//! - `query`: 单字段比较条件

mod collection;
mod query;
mod record;

pub use collection::Collection;
pub use query::{FieldFilter, QueryOperator, compare_values};
pub use record::{ID_FIELD, ID_PRECEDENCE, Record, derive_id};

pub(crate) use record::json_type_name;

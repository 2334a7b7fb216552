//! 单字段比较查询
//!
//! 运算符是封闭枚举，通过 match 分派，不存在非法运算符的运行时分支。

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "!=")]
    Neq,
}

impl QueryOperator {
    /// 调用方使用的符号形式
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::Neq => "!=",
        }
    }

    /// SQL 运算符
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::Neq => "<>",
        }
    }

    /// 对单个字段值求值
    ///
    /// - 缺失字段永远不等于任何值，因此 `Neq` 对缺失字段为真
    /// - 数字按数值比较，字符串按字典序，布尔 false < true
    /// - 类型不一致或字段缺失时，范围运算不成立
    pub fn matches(&self, field_value: Option<&Value>, target: &Value) -> bool {
        match self {
            Self::Eq => field_value.is_some_and(|v| values_equal(v, target)),
            Self::Neq => !field_value.is_some_and(|v| values_equal(v, target)),
            Self::Lt => ordering_of(field_value, target).is_some_and(|o| o == Ordering::Less),
            Self::Gt => ordering_of(field_value, target).is_some_and(|o| o == Ordering::Greater),
            Self::Lte => ordering_of(field_value, target).is_some_and(|o| o != Ordering::Greater),
            Self::Gte => ordering_of(field_value, target).is_some_and(|o| o != Ordering::Less),
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for QueryOperator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" | "=" => Ok(Self::Eq),
            "<" => Ok(Self::Lt),
            ">" => Ok(Self::Gt),
            "<=" => Ok(Self::Lte),
            ">=" => Ok(Self::Gte),
            "!=" | "<>" => Ok(Self::Neq),
            other => Err(StorageError::InvalidOperator(other.to_string())),
        }
    }
}

/// 单字段查询条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: QueryOperator,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: QueryOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, QueryOperator::Eq, value)
    }

    /// 对一条记录求值
    pub fn matches(&self, record: &crate::models::Record) -> bool {
        self.op.matches(record.get(&self.field), &self.value)
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn ordering_of(field_value: Option<&Value>, target: &Value) -> Option<Ordering> {
    field_value.and_then(|v| compare_values(v, target))
}

/// 同类型值的全序比较，不同类型返回 None
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_symbols() {
        let cases = [
            ("==", QueryOperator::Eq),
            ("<", QueryOperator::Lt),
            (">", QueryOperator::Gt),
            ("<=", QueryOperator::Lte),
            (">=", QueryOperator::Gte),
            ("!=", QueryOperator::Neq),
        ];
        for (symbol, expected) in cases {
            let op: QueryOperator = symbol.parse().unwrap();
            assert_eq!(op, expected);
            assert_eq!(op.symbol(), symbol);
        }
        assert!(matches!(
            "array-contains".parse::<QueryOperator>(),
            Err(StorageError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_sql_symbols() {
        assert_eq!(QueryOperator::Eq.sql(), "=");
        assert_eq!(QueryOperator::Neq.sql(), "<>");
    }

    #[test]
    fn test_numeric_comparisons() {
        let v = json!(15);
        assert!(QueryOperator::Gt.matches(Some(&v), &json!(10)));
        assert!(QueryOperator::Gte.matches(Some(&v), &json!(15.0)));
        assert!(QueryOperator::Eq.matches(Some(&v), &json!(15.0)));
        assert!(QueryOperator::Lt.matches(Some(&v), &json!(15.5)));
        assert!(!QueryOperator::Lte.matches(Some(&v), &json!(14)));
    }

    #[test]
    fn test_string_comparisons() {
        let v = json!("2024-05-01");
        assert!(QueryOperator::Lt.matches(Some(&v), &json!("2024-06-01")));
        assert!(QueryOperator::Neq.matches(Some(&v), &json!("2024-06-01")));
    }

    #[test]
    fn test_mismatched_types_never_order() {
        let v = json!("10");
        assert!(!QueryOperator::Gt.matches(Some(&v), &json!(5)));
        assert!(!QueryOperator::Lte.matches(Some(&v), &json!(5)));
        assert!(!QueryOperator::Eq.matches(Some(&v), &json!(10)));
    }

    #[test]
    fn test_missing_field() {
        assert!(!QueryOperator::Eq.matches(None, &json!("active")));
        assert!(QueryOperator::Neq.matches(None, &json!("active")));
        assert!(!QueryOperator::Gte.matches(None, &json!(0)));
    }

    #[test]
    fn test_serde_symbols() {
        let op: QueryOperator = serde_json::from_str("\"!=\"").unwrap();
        assert_eq!(op, QueryOperator::Neq);
        assert_eq!(serde_json::to_string(&QueryOperator::Lte).unwrap(), "\"<=\"");
    }
}

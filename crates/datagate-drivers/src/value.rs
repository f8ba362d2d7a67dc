// SPDX-License-Identifier: Apache-2.0

//! Dialect-neutral row values returned by the pooled handle.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row {
            columns: vec!["id".into(), "name".into()],
            values: vec![Value::Int(7), Value::Text("ada".into())],
        };
        assert_eq!(row.get("id").and_then(Value::as_i64), Some(7));
        assert_eq!(row.get("name").and_then(Value::as_str), Some("ada"));
        assert!(row.get("missing").is_none());
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_values_serialize_untagged() {
        let json = serde_json::to_string(&vec![Value::Null, Value::Int(1), Value::Text("x".into())]).unwrap();
        assert_eq!(json, r#"[null,1,"x"]"#);
    }
}

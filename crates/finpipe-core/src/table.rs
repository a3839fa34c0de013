use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell returned by the warehouse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text is accepted when it parses as a number,
    /// since some drivers hand back NUMERIC/DECIMAL columns as strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Tabular query result: ordered column names and ordered rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: vec![] }
    }

    /// Convenience for the common single-row aggregate result.
    pub fn single_row(columns: &[&str], values: Vec<Value>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![values],
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column lookup is case-insensitive; warehouses disagree on identifier folding.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Row `i` as (column, value) pairs in column order.
    pub fn named_row(&self, i: usize) -> Option<Vec<(&str, &Value)>> {
        let row = self.rows.get(i)?;
        Some(self.columns.iter().map(String::as_str).zip(row.iter()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Integer(7).as_f64(), Some(7.0));
        assert_eq!(Value::Real(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::Text(" 10000.50 ".into()).as_f64(), Some(10000.5));
        assert_eq!(Value::Text("n/a".into()).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
        assert_eq!(Value::Real(3.0).as_i64(), Some(3));
        assert_eq!(Value::Real(3.5).as_i64(), None);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let t = Table::single_row(&["ROW_COUNT"], vec![Value::Integer(12)]);
        assert_eq!(t.value(0, "row_count"), Some(&Value::Integer(12)));
        assert_eq!(t.value(1, "row_count"), None);
        assert_eq!(t.value(0, "missing"), None);
    }

    #[test]
    fn named_row_keeps_column_order() {
        let t = Table::single_row(
            &["fact_total", "mart_total", "difference"],
            vec![Value::Real(1.0), Value::Real(2.0), Value::Real(1.0)],
        );
        let names: Vec<&str> = t.named_row(0).unwrap().into_iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["fact_total", "mart_total", "difference"]);
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::Null, Value::Integer(1), Value::Text("a".into())]).unwrap();
        assert_eq!(json, r#"[null,1,"a"]"#);
    }
}

//! Typed columns

use crate::error::{CoreError, Result};
use crate::value::{parse_date, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    /// Categorical text, the usual grouping key
    Label,
    /// Free text
    Text,
    Number,
    Date,
}

impl ColumnType {
    /// Whether `value` can be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Label | ColumnType::Text, Value::Text(_))
                | (ColumnType::Number, Value::Number(_))
                | (ColumnType::Date, Value::Date(_))
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Label | ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Label => "LABEL",
            ColumnType::Text => "TEXT",
            ColumnType::Number => "NUMBER",
            ColumnType::Date => "DATE",
        };
        f.write_str(name)
    }
}

/// A named, typed sequence of values addressed by row position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColumn")]
pub struct Column {
    id: String,
    column_type: ColumnType,
    values: Vec<Value>,
}

/// Wire shape of a column; decoded values are checked by [`Column::new`]
#[derive(Deserialize)]
struct RawColumn {
    id: String,
    column_type: ColumnType,
    #[serde(default)]
    values: Vec<Value>,
}

impl TryFrom<RawColumn> for Column {
    type Error = CoreError;

    fn try_from(raw: RawColumn) -> Result<Self> {
        // dates travel as text; untagged decoding cannot tell them apart
        let values = match raw.column_type {
            ColumnType::Date => raw
                .values
                .into_iter()
                .map(|v| match v.as_str().and_then(parse_date) {
                    Some(d) => Value::Date(d),
                    None => v,
                })
                .collect(),
            _ => raw.values,
        };
        Column::new(raw.id, raw.column_type, values)
    }
}

impl Column {
    /// Create a column, checking every value against `column_type`
    pub fn new(id: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Result<Self> {
        let id = id.into();
        if let Some((row, bad)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !column_type.accepts(v))
        {
            return Err(CoreError::invalid_value(
                id,
                format!("row {} holds a {} value in a {} column", row, bad.kind(), column_type),
            ));
        }
        Ok(Self {
            id,
            column_type,
            values,
        })
    }

    pub fn empty(id: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            column_type,
            values: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `row`, or null when out of range
    pub fn get(&self, row: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(row).unwrap_or(&NULL)
    }

    /// Case-insensitive id match
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// New column holding the values at `rows`, in that order
    pub fn take(&self, rows: &[usize]) -> Column {
        Column {
            id: self.id.clone(),
            column_type: self.column_type,
            values: rows.iter().map(|&r| self.get(r).clone()).collect(),
        }
    }

    /// Same values under a different id
    pub fn renamed(mut self, id: impl Into<String>) -> Column {
        self.id = id.into();
        self
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<()> {
        if !self.column_type.accepts(&value) {
            return Err(CoreError::invalid_value(
                self.id.clone(),
                format!("cannot store a {} value in a {} column", value.kind(), self.column_type),
            ));
        }
        self.values.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mistyped_values() {
        let err = Column::new("amount", ColumnType::Number, vec![Value::text("x")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { .. }));
    }

    #[test]
    fn test_nulls_fit_any_type() {
        for ty in [ColumnType::Label, ColumnType::Text, ColumnType::Number, ColumnType::Date] {
            assert!(Column::new("c", ty, vec![Value::Null]).is_ok());
        }
    }

    #[test]
    fn test_take_reorders() {
        let col = Column::new(
            "n",
            ColumnType::Number,
            vec![Value::number(1), Value::number(2), Value::number(3)],
        )
        .unwrap();
        let taken = col.take(&[2, 0]);
        assert_eq!(taken.values(), &[Value::number(3), Value::number(1)]);
    }

    #[test]
    fn test_deserialize_parses_dates() {
        let d = parse_date("2020-05-01 10:30:00").unwrap();
        let col = Column::new("when", ColumnType::Date, vec![Value::Date(d), Value::Null]).unwrap();
        let json = serde_json::to_string(&col).unwrap();
        assert_eq!(serde_json::from_str::<Column>(&json).unwrap(), col);

        let bad = r#"{"id":"when","column_type":"DATE","values":["not a date"]}"#;
        assert!(serde_json::from_str::<Column>(bad).is_err());
    }

    #[test]
    fn test_deserialize_checks_value_types() {
        let json = r#"{"id":"amount","column_type":"NUMBER","values":[1,"oops"]}"#;
        let err = serde_json::from_str::<Column>(json).unwrap_err();
        assert!(err.to_string().contains("amount"), "{err}");
    }
}

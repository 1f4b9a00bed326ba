//! Datasets: ordered, equal-length columns sharing a row space

use crate::column::{Column, ColumnType};
use crate::error::{CoreError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Immutable tabular data identified by a UUID.
///
/// Row `i` is the tuple of `columns[j].values()[i]`. Every column has the
/// same length; [`DataSet::new`] enforces this and every operation that
/// derives a new dataset preserves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataSet")]
pub struct DataSet {
    uuid: String,
    columns: Vec<Column>,
}

/// Wire shape of a dataset; decoded columns are checked by [`DataSet::new`]
#[derive(Deserialize)]
struct RawDataSet {
    uuid: String,
    #[serde(default)]
    columns: Vec<Column>,
}

impl TryFrom<RawDataSet> for DataSet {
    type Error = CoreError;

    fn try_from(raw: RawDataSet) -> Result<Self> {
        DataSet::new(raw.uuid, raw.columns)
    }
}

/// Shape of a dataset, without its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetMetadata {
    pub uuid: String,
    pub row_count: usize,
    pub column_ids: Vec<String>,
    pub column_types: Vec<ColumnType>,
}

impl DataSetMetadata {
    pub fn column_count(&self) -> usize {
        self.column_ids.len()
    }
}

impl DataSet {
    pub fn new(uuid: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let ds = Self {
            uuid: uuid.into(),
            columns,
        };
        ds.validate()?;
        Ok(ds)
    }

    /// A dataset with no columns and no rows
    pub fn empty(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            columns: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        let expected = self.columns.first().map(Column::len).unwrap_or(0);
        for (i, col) in self.columns.iter().enumerate() {
            if col.len() != expected {
                return Err(CoreError::ColumnLengthMismatch {
                    column: col.id().to_string(),
                    expected,
                    actual: col.len(),
                });
            }
            if self.columns[..i].iter().any(|c| c.has_id(col.id())) {
                return Err(CoreError::DuplicateColumn(col.id().to_string()));
            }
        }
        Ok(())
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Position of the column whose id matches `id` case-insensitively
    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.has_id(id))
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.column_index(id).map(|i| &self.columns[i])
    }

    /// Like [`DataSet::column`] but fails with `UnknownColumn`
    pub fn require_column(&self, id: &str) -> Result<&Column> {
        self.column(id).ok_or_else(|| CoreError::unknown_column(id))
    }

    pub fn value_at(&self, row: usize, column: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.columns.get(column).map(|c| c.get(row)).unwrap_or(&NULL)
    }

    /// Cells of row `row`, in column order
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(row).clone()).collect()
    }

    /// New dataset holding `rows` in the given order, every column in lockstep
    pub fn take_rows(&self, rows: &[usize]) -> DataSet {
        DataSet {
            uuid: self.uuid.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Keep only the columns named in `ids`, in that order
    pub fn project<S: AsRef<str>>(&self, ids: &[S]) -> Result<DataSet> {
        let mut columns = Vec::with_capacity(ids.len());
        for id in ids {
            columns.push(self.require_column(id.as_ref())?.clone());
        }
        DataSet::new(self.uuid.clone(), columns)
    }

    /// Rows `[offset, offset + count)`, clamped to the dataset bounds
    pub fn slice(&self, offset: usize, count: Option<usize>) -> DataSet {
        let total = self.row_count();
        let start = offset.min(total);
        let end = match count {
            Some(n) => start.saturating_add(n).min(total),
            None => total,
        };
        let rows: Vec<usize> = (start..end).collect();
        self.take_rows(&rows)
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> DataSet {
        self.uuid = uuid.into();
        self
    }

    pub fn metadata(&self) -> DataSetMetadata {
        DataSetMetadata {
            uuid: self.uuid.clone(),
            row_count: self.row_count(),
            column_ids: self.columns.iter().map(|c| c.id().to_string()).collect(),
            column_types: self.columns.iter().map(Column::column_type).collect(),
        }
    }
}

/// Row-oriented builder for datasets
///
/// ```ignore
/// let ds = DataSetBuilder::new("expenses")
///     .label("department")
///     .number("amount")
///     .row(vec!["Engineering".into(), 100.into()])
///     .build()?;
/// ```
#[derive(Debug)]
pub struct DataSetBuilder {
    uuid: String,
    columns: Vec<Column>,
    error: Option<CoreError>,
}

impl DataSetBuilder {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            columns: Vec::new(),
            error: None,
        }
    }

    pub fn column(mut self, id: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column::empty(id, column_type));
        self
    }

    pub fn label(self, id: impl Into<String>) -> Self {
        self.column(id, ColumnType::Label)
    }

    pub fn text(self, id: impl Into<String>) -> Self {
        self.column(id, ColumnType::Text)
    }

    pub fn number(self, id: impl Into<String>) -> Self {
        self.column(id, ColumnType::Number)
    }

    pub fn date(self, id: impl Into<String>) -> Self {
        self.column(id, ColumnType::Date)
    }

    /// Append a row; values are matched to columns positionally.
    ///
    /// A short row is padded with nulls. The first error (extra cells,
    /// mistyped value) is kept and reported by [`DataSetBuilder::build`].
    pub fn row(mut self, values: Vec<Value>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let mut values = values.into_iter();
        for col in self.columns.iter_mut() {
            let v = values.next().unwrap_or(Value::Null);
            if let Err(e) = col.push(v) {
                self.error = Some(e);
                return self;
            }
        }
        if values.next().is_some() {
            self.error = Some(CoreError::invalid_value(
                self.uuid.clone(),
                format!("row has more than {} cells", self.columns.len()),
            ));
        }
        self
    }

    pub fn build(self) -> Result<DataSet> {
        if let Some(e) = self.error {
            return Err(e);
        }
        DataSet::new(self.uuid, self.columns)
    }
}

//! Column selection

use crate::error::{QueryError, Result};
use tabula_db_core::DataSet;

/// Keep the selected columns in the requested order; `None` keeps all.
///
/// Ids match case-insensitively. Unknown ids are an `InvalidRequest`.
pub fn select_columns(dataset: DataSet, selected: Option<&[String]>) -> Result<DataSet> {
    let Some(ids) = selected else {
        return Ok(dataset);
    };
    if let Some(missing) = ids.iter().find(|id| dataset.column(id).is_none()) {
        return Err(QueryError::unknown_column(missing));
    }
    dataset.project(ids).map_err(|e| match e {
        tabula_db_core::CoreError::DuplicateColumn(id) => {
            QueryError::invalid_request(format!("Column selected twice: {}", id))
        }
        other => other.into(),
    })
}

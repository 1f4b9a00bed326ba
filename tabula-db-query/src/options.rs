//! Execution options shared by every stage of the pipeline

use chrono::NaiveDateTime;

/// Where null values land in a sorted result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullOrdering {
    /// Nulls before every non-null value, in both directions
    #[default]
    First,
    /// Nulls after every non-null value, in both directions
    Last,
}

/// Knobs that change lookup semantics
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// LIKE_TO default case sensitivity (a predicate may override it)
    pub like_case_sensitive: bool,
    pub null_ordering: NullOrdering,
    /// Consult the dataset index for index-friendly predicates
    pub use_indices: bool,
    /// Reference instant for TIME_FRAME; `None` reads the local clock
    pub now: Option<NaiveDateTime>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            like_case_sensitive: false,
            null_ordering: NullOrdering::First,
            use_indices: true,
            now: None,
        }
    }
}

impl QueryOptions {
    pub fn now(&self) -> NaiveDateTime {
        self.now
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }
}

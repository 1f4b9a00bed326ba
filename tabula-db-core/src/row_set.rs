//! Sorted sets of row positions

use serde::{Deserialize, Serialize};

/// Strictly increasing row positions.
///
/// Set algebra is linear merges over the sorted vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowSet(Vec<usize>);

impl RowSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Rows `0..n`
    pub fn all(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Build from arbitrary positions (sorted and deduplicated here)
    pub fn from_unsorted(mut rows: Vec<usize>) -> Self {
        rows.sort_unstable();
        rows.dedup();
        Self(rows)
    }

    /// Build from positions already strictly increasing
    pub fn from_sorted(rows: Vec<usize>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0] < w[1]));
        Self(rows)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, row: usize) -> bool {
        self.0.binary_search(&row).is_ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }

    pub fn intersect(&self, other: &RowSet) -> RowSet {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len().min(b.len()));
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        RowSet(out)
    }

    pub fn union(&self, other: &RowSet) -> RowSet {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        RowSet(out)
    }

    /// Rows of `self` not in `other`
    pub fn difference(&self, other: &RowSet) -> RowSet {
        RowSet(self.0.iter().copied().filter(|r| !other.contains(*r)).collect())
    }
}

impl FromIterator<usize> for RowSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        RowSet::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a usize;
    type IntoIter = std::slice::Iter<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

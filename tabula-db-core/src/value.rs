//! Cell values
//!
//! A `Value` is the content of a single cell. Columns are homogeneous, so the
//! cross-type ordering below only matters for heterogeneous argument lists
//! and is never observed when comparing two cells of the same column.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Canonical textual format for dates (display, JOIN, labels)
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats accepted when parsing a date out of text
const DATE_PARSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

// Canonical NaN bit pattern (quiet NaN)
const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// A single cell value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(Arc<str>),
    Date(NaiveDateTime),
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Arc::from(s.as_ref()))
    }

    pub fn number(n: impl Into<f64>) -> Self {
        Value::Number(n.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::Text(_) => 2,
            Value::Date(_) => 3,
        }
    }

    /// Deterministic 64-bit hash, stable across processes.
    ///
    /// Type tags keep e.g. text "1" and number 1 apart; NaN and -0.0 are
    /// canonicalized so values that compare equal hash equal.
    pub fn canonical_hash(&self) -> u64 {
        use xxhash_rust::xxh64::Xxh64;
        let mut hasher = Xxh64::new(0);
        self.write_canonical(&mut |bytes| hasher.update(bytes));
        hasher.digest()
    }

    /// Feed the canonical byte encoding of this value to `sink`
    pub fn write_canonical(&self, sink: &mut dyn FnMut(&[u8])) {
        match self {
            Value::Null => sink(b"\x00null"),
            Value::Number(n) => {
                let mut buf = [0u8; 9];
                buf[0] = 0x01;
                buf[1..].copy_from_slice(&canonical_bits(*n).to_le_bytes());
                sink(&buf);
            }
            Value::Text(s) => {
                sink(&[0x02]);
                sink(&(s.len() as u64).to_le_bytes());
                sink(s.as_bytes());
            }
            Value::Date(d) => {
                let micros = d.and_utc().timestamp_micros();
                let mut buf = [0u8; 9];
                buf[0] = 0x03;
                buf[1..].copy_from_slice(&micros.to_le_bytes());
                sink(&buf);
            }
        }
    }
}

fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        CANONICAL_NAN_BITS
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

fn canonical_f64(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

/// Parse a date from its textual form
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in DATE_PARSE_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Render a number without a trailing ".0" when it is integral
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Null sorts first; numbers by magnitude, text lexically, dates chronologically
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Number(a), Value::Number(b)) => {
                canonical_f64(*a).total_cmp(&canonical_f64(*b))
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

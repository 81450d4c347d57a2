// Index keys, collation order, key ranges, and key-path extraction for stored JSON records.
use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use serde_json::Value;

/// A value usable as a primary or index key.
///
/// Keys of different types order as numbers < strings < arrays. Strings compare
/// under [`collate`]; arrays compare element by element, shorter prefix first.
#[derive(Clone, Debug)]
pub enum IndexKey {
    Number(f64),
    String(String),
    Array(Vec<IndexKey>),
}

impl IndexKey {
    /// Converts a JSON value into a key. Returns `None` for values that cannot be keys
    /// (null, booleans, objects, or arrays containing any of those).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64().map(IndexKey::Number),
            Value::String(text) => Some(IndexKey::String(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(IndexKey::from_value)
                .collect::<Option<Vec<_>>>()
                .map(IndexKey::Array),
            Value::Null | Value::Bool(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            IndexKey::String(text) => Some(text),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            IndexKey::Number(_) => 0,
            IndexKey::String(_) => 1,
            IndexKey::Array(_) => 2,
        }
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::String(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::String(value)
    }
}

impl From<f64> for IndexKey {
    fn from(value: f64) -> Self {
        IndexKey::Number(value)
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Number(a), IndexKey::Number(b)) => a.total_cmp(b),
            (IndexKey::String(a), IndexKey::String(b)) => collate(a, b),
            (IndexKey::Array(a), IndexKey::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ord = left.cmp(right);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Number(number) => write!(f, "{number}"),
            IndexKey::String(text) => write!(f, "{text}"),
            IndexKey::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Collation used for string keys: whitespace < letters and digits < everything else,
/// then code point within a class. Equal only for identical strings.
pub fn collate(a: &str, b: &str) -> Ordering {
    let mut left = a.chars();
    let mut right = b.chars();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = collation_weight(l).cmp(&collation_weight(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn collation_weight(c: char) -> (u8, u32) {
    let class = if c.is_whitespace() {
        0
    } else if c.is_alphanumeric() {
        1
    } else {
        2
    };
    (class, c as u32)
}

/// Resolves a dotted key path (`displayName.givenName`) against a record.
pub fn value_at_path<'a>(value: &'a Value, key_path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in key_path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Extracts a valid key at `key_path`, or `None` when the record is not indexable there.
pub fn extract_key(value: &Value, key_path: &str) -> Option<IndexKey> {
    value_at_path(value, key_path).and_then(IndexKey::from_value)
}

#[derive(Clone, Debug)]
pub struct KeyRange {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn lower_bound(key: impl Into<IndexKey>, open: bool) -> Self {
        let key = key.into();
        Self {
            lower: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
            upper: Bound::Unbounded,
        }
    }

    pub fn upper_bound(key: impl Into<IndexKey>, open: bool) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
        }
    }

    pub fn only(key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        let above_lower = match &self.lower {
            Bound::Included(lower) => key >= lower,
            Bound::Excluded(lower) => key > lower,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(upper) => key <= upper,
            Bound::Excluded(upper) => key < upper,
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }

    /// True when the range cannot contain any key. `BTreeMap::range` panics on such bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lower), Bound::Included(upper)) => lower > upper,
            (Bound::Included(lower), Bound::Excluded(upper))
            | (Bound::Excluded(lower), Bound::Included(upper))
            | (Bound::Excluded(lower), Bound::Excluded(upper)) => lower >= upper,
            _ => false,
        }
    }
}

//! Store adapter interface
//!
//! The engine never reads raw metrics itself. Each dispatched builder query is
//! handed to a [`SeriesStore`], which selects matching raw series, applies the
//! query's time aggregation per series and step, then its space aggregation per
//! [`SeriesKey`]. [`InMemoryStore`] is the reference implementation.

mod memory;

pub use memory::{InMemoryStore, RawSeries};

use async_trait::async_trait;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::StoreError;
use crate::query::BuilderQuery;
use crate::types::{EvalWindow, Sample};

// =============================================================================
// Series Store Trait
// =============================================================================

/// Evaluates builder queries against a metrics store
#[async_trait]
pub trait SeriesStore: Send + Sync + 'static {
    /// Evaluate one builder query over `window`
    ///
    /// Returns one [`SeriesResult`] per distinct group-by key. Samples should be
    /// sorted by timestamp; the engine re-sorts them anyway.
    async fn evaluate(
        &self,
        query: &BuilderQuery,
        window: EvalWindow,
    ) -> Result<Vec<SeriesResult>, StoreError>;
}

// =============================================================================
// Series Key
// =============================================================================

/// Group-by dimension values identifying one output series
///
/// Pairs keep the group-by display order, but equality, hashing and ordering
/// are by the set of pairs keyed on dimension name.
#[derive(Debug, Clone, Default)]
pub struct SeriesKey {
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Key with no dimensions (ungrouped query)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(dimension, value)` pairs in display order
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a dimension
    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == dimension)
            .map(|(_, v)| v.as_str())
    }

    /// Pairs in display order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Dimension names in display order
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(k, _)| k.as_str())
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the key has no dimensions
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn canonical(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self.pairs().collect();
        pairs.sort_unstable();
        pairs
    }
}

impl PartialEq for SeriesKey {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len() && self.canonical() == other.canonical()
    }
}

impl Eq for SeriesKey {}

impl Hash for SeriesKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl PartialOrd for SeriesKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SeriesKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Series Result
// =============================================================================

/// One output series of a query
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesResult {
    /// Group-by key
    pub key: SeriesKey,

    /// Samples sorted by timestamp
    pub samples: Vec<Sample>,
}

impl SeriesResult {
    /// Create a series result
    pub fn new(key: SeriesKey, samples: Vec<Sample>) -> Self {
        Self { key, samples }
    }

    /// Timestamp of the last sample
    pub fn last_timestamp(&self) -> Option<i64> {
        self.samples.last().map(|s| s.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_is_order_insensitive() {
        let a = SeriesKey::from_pairs([("host_name", "web-1"), ("os_type", "linux")]);
        let b = SeriesKey::from_pairs([("os_type", "linux"), ("host_name", "web-1")]);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_key_display_keeps_order() {
        let key = SeriesKey::from_pairs([("os_type", "linux"), ("host_name", "web-1")]);
        assert_eq!(key.to_string(), r#"{os_type="linux", host_name="web-1"}"#);
        assert_eq!(key.get("host_name"), Some("web-1"));
        assert_eq!(key.get("pid"), None);
    }

    #[test]
    fn test_key_ordering() {
        let a = SeriesKey::from_pairs([("host_name", "a")]);
        let b = SeriesKey::from_pairs([("host_name", "b")]);
        assert!(a < b);
        assert!(SeriesKey::empty() < a);
    }
}

//! In-memory reference store
//!
//! Holds registered raw series and evaluates builder queries with the two-stage
//! aggregation from [`crate::aggregation`]. Suitable for tests, benchmarks and
//! embedders that already have their samples in memory.
//!
//! ```rust
//! use kuba_compose::query::Labels;
//! use kuba_compose::store::InMemoryStore;
//! use kuba_compose::types::Sample;
//!
//! let store = InMemoryStore::new();
//! store.add_series(
//!     "system_cpu_time",
//!     Labels::new().with_resource("host_name", "web-1").with_tag("state", "user"),
//!     vec![Sample::new(0, 10.0), Sample::new(60_000, 70.0)],
//! );
//! assert_eq!(store.series_count(), 1);
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{SeriesKey, SeriesResult, SeriesStore};
use crate::aggregation::{aggregate_space, aggregate_time};
use crate::error::StoreError;
use crate::query::{BuilderQuery, Labels};
use crate::types::{normalize_samples, EvalWindow, Sample};

/// A raw series as reported by instrumentation
#[derive(Debug, Clone)]
pub struct RawSeries {
    /// Metric name
    pub metric: String,
    /// Tag and resource labels
    pub labels: Labels,
    /// Samples sorted by timestamp
    pub samples: Vec<Sample>,
}

/// Store adapter over raw series held in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    series: RwLock<Vec<RawSeries>>,
    evaluations: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw series
    pub fn add_series(&self, metric: impl Into<String>, labels: Labels, mut samples: Vec<Sample>) {
        normalize_samples(&mut samples);
        self.series.write().push(RawSeries {
            metric: metric.into(),
            labels,
            samples,
        });
    }

    /// Number of registered raw series
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Number of `evaluate` calls served
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    fn series_key(query: &BuilderQuery, labels: &Labels) -> SeriesKey {
        SeriesKey::from_pairs(query.group_by.iter().map(|key| {
            let value = labels.get(key).map(|v| v.as_string()).unwrap_or_default();
            (key.name.clone(), value)
        }))
    }
}

#[async_trait]
impl SeriesStore for InMemoryStore {
    async fn evaluate(
        &self,
        query: &BuilderQuery,
        window: EvalWindow,
    ) -> Result<Vec<SeriesResult>, StoreError> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let mut groups: BTreeMap<SeriesKey, Vec<Vec<Sample>>> = BTreeMap::new();
        let mut matched = 0usize;
        {
            let series = self.series.read();
            for raw in series.iter() {
                if raw.metric != query.metric.name || !query.filters.matches(&raw.labels) {
                    continue;
                }
                matched += 1;
                let aggregated = aggregate_time(
                    &raw.samples,
                    &window,
                    query.time_aggregation,
                    query.temporality,
                );
                groups
                    .entry(Self::series_key(query, &raw.labels))
                    .or_default()
                    .push(aggregated);
            }
        }

        debug!(
            query = %query.name,
            metric = %query.metric.name,
            matched,
            groups = groups.len(),
            "Evaluated builder query in memory"
        );

        Ok(groups
            .into_iter()
            .map(|(key, series)| {
                SeriesResult::new(key, aggregate_space(&series, query.space_aggregation))
            })
            .collect())
    }
}

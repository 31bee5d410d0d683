//! Space-Time Aggregation
//!
//! Two-phase aggregation used by store adapters and the result formatter:
//!
//! 1. **Time**: each raw series is bucketed by step and reduced with the query's
//!    [`TimeAggregation`]. `rate`/`increase` look at consecutive samples.
//! 2. **Space**: time-aggregated series sharing a series key are merged per
//!    bucket with the query's [`SpaceAggregation`].
//!
//! [`reduce`] collapses a whole series to one scalar for table output.
//!
//! ```text
//! raw series (host=a, cpu=0)  ──time──┐
//! raw series (host=a, cpu=1)  ──time──┼──space──▶ series {host=a}
//! raw series (host=a, cpu=2)  ──time──┘
//! ```

use std::collections::{BTreeMap, HashSet};

use crate::query::{ReduceTo, SpaceAggregation, Temporality, TimeAggregation};
use crate::types::{EvalWindow, Sample};

// ============================================================================
// Aggregate State
// ============================================================================

/// Running state for one bucket
///
/// Tracks enough to finalize any supported function; distinct values are only
/// kept when requested.
#[derive(Debug, Clone)]
pub struct AggregateState {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    last: Option<(i64, f64)>,
    distinct: Option<HashSet<u64>>,
}

impl AggregateState {
    /// Create new empty state
    pub fn new() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            last: None,
            distinct: None,
        }
    }

    /// Create state that also counts distinct values
    pub fn with_distinct() -> Self {
        Self {
            distinct: Some(HashSet::new()),
            ..Self::new()
        }
    }

    /// Add a value with timestamp
    pub fn add(&mut self, timestamp: i64, value: f64) {
        self.sum += value;
        self.count += 1;

        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }

        match self.last {
            Some((ts, _)) if ts > timestamp => {}
            _ => self.last = Some((timestamp, value)),
        }

        if let Some(ref mut distinct) = self.distinct {
            distinct.insert(value.to_bits());
        }
    }

    /// Merge another state into this one
    pub fn merge(&mut self, other: &AggregateState) {
        if other.count == 0 {
            return;
        }

        if let Some((ts, val)) = other.last {
            if self.last.map_or(true, |(own, _)| ts >= own) {
                self.last = Some((ts, val));
            }
        }

        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;

        if let (Some(own), Some(theirs)) = (&mut self.distinct, &other.distinct) {
            own.extend(theirs);
        }
    }

    /// Number of values added
    pub fn count(&self) -> u64 {
        self.count
    }

    fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Finalize for a time aggregation
    ///
    /// Returns `None` for empty buckets and for `rate`/`increase`, which need
    /// consecutive samples rather than a bucket summary.
    pub fn finalize_time(&self, function: TimeAggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match function {
            TimeAggregation::Latest => self.last.map(|(_, v)| v),
            TimeAggregation::Sum => Some(self.sum),
            TimeAggregation::Avg => Some(self.avg()),
            TimeAggregation::Min => Some(self.min),
            TimeAggregation::Max => Some(self.max),
            TimeAggregation::Count => Some(self.count as f64),
            TimeAggregation::CountDistinct => {
                self.distinct.as_ref().map(|d| d.len() as f64)
            }
            TimeAggregation::Rate | TimeAggregation::Increase => None,
        }
    }

    /// Finalize for a space aggregation
    pub fn finalize_space(&self, function: SpaceAggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match function {
            SpaceAggregation::Sum => self.sum,
            SpaceAggregation::Avg => self.avg(),
            SpaceAggregation::Min => self.min,
            SpaceAggregation::Max => self.max,
            SpaceAggregation::Count => self.count as f64,
        })
    }

    /// Finalize for a table reduction
    pub fn finalize_reduce(&self, reduce_to: ReduceTo) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match reduce_to {
            ReduceTo::Last => self.last.map(|(_, v)| v),
            ReduceTo::Sum => Some(self.sum),
            ReduceTo::Avg => Some(self.avg()),
            ReduceTo::Min => Some(self.min),
            ReduceTo::Max => Some(self.max),
        }
    }
}

impl Default for AggregateState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Time Aggregation
// ============================================================================

/// Bucket one raw series by step and reduce each bucket
///
/// Samples outside the window's range are ignored. Output timestamps are bucket
/// starts, ascending; buckets without a value are omitted.
pub fn aggregate_time(
    samples: &[Sample],
    window: &EvalWindow,
    function: TimeAggregation,
    temporality: Temporality,
) -> Vec<Sample> {
    let in_range = samples.iter().filter(|s| window.range.contains(s.timestamp));

    if function.is_counter_function() {
        return counter_increase(in_range, window, function, temporality);
    }

    let mut buckets: BTreeMap<i64, AggregateState> = BTreeMap::new();
    for sample in in_range {
        buckets
            .entry(window.bucket_start(sample.timestamp))
            .or_insert_with(|| match function {
                TimeAggregation::CountDistinct => AggregateState::with_distinct(),
                _ => AggregateState::new(),
            })
            .add(sample.timestamp, sample.value);
    }

    buckets
        .into_iter()
        .filter_map(|(ts, state)| state.finalize_time(function).map(|v| Sample::new(ts, v)))
        .collect()
}

/// `rate` and `increase` per bucket
///
/// Cumulative (and unspecified) series contribute the positive difference
/// between consecutive samples; a drop is a counter reset and contributes the
/// new value. Delta series contribute each sample as is. Rate divides the
/// bucket total by the step in seconds.
fn counter_increase<'a>(
    samples: impl Iterator<Item = &'a Sample>,
    window: &EvalWindow,
    function: TimeAggregation,
    temporality: Temporality,
) -> Vec<Sample> {
    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    let mut previous: Option<f64> = None;

    for sample in samples {
        let increase = match temporality {
            Temporality::Delta => Some(sample.value),
            Temporality::Cumulative | Temporality::Unspecified => {
                let inc = previous.map(|prev| {
                    if sample.value >= prev {
                        sample.value - prev
                    } else {
                        sample.value
                    }
                });
                previous = Some(sample.value);
                inc
            }
        };

        if let Some(inc) = increase {
            *buckets.entry(window.bucket_start(sample.timestamp)).or_insert(0.0) += inc;
        }
    }

    let step_secs = window.step_ms() as f64 / 1000.0;
    buckets
        .into_iter()
        .map(|(ts, total)| match function {
            TimeAggregation::Rate => Sample::new(ts, total / step_secs),
            _ => Sample::new(ts, total),
        })
        .collect()
}

// ============================================================================
// Space Aggregation
// ============================================================================

/// Merge time-aggregated series per timestamp
pub fn aggregate_space(series: &[Vec<Sample>], function: SpaceAggregation) -> Vec<Sample> {
    let mut buckets: BTreeMap<i64, AggregateState> = BTreeMap::new();
    for samples in series {
        for sample in samples {
            buckets
                .entry(sample.timestamp)
                .or_default()
                .add(sample.timestamp, sample.value);
        }
    }

    buckets
        .into_iter()
        .filter_map(|(ts, state)| state.finalize_space(function).map(|v| Sample::new(ts, v)))
        .collect()
}

// ============================================================================
// Reduction
// ============================================================================

/// Reduce a series to one scalar; `None` when there are no samples
pub fn reduce(samples: &[Sample], reduce_to: ReduceTo) -> Option<f64> {
    let mut state = AggregateState::new();
    for sample in samples {
        state.add(sample.timestamp, sample.value);
    }
    state.finalize_reduce(reduce_to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeRange;
    use std::time::Duration;

    fn window(step_secs: u64) -> EvalWindow {
        EvalWindow::new(
            TimeRange::new(0, 600_000).unwrap(),
            Duration::from_secs(step_secs),
        )
    }

    fn samples(points: &[(i64, f64)]) -> Vec<Sample> {
        points.iter().copied().map(Sample::from).collect()
    }

    #[test]
    fn test_reduce() {
        let s = samples(&[(1, 2.0), (2, 4.0), (3, 6.0)]);
        assert_eq!(reduce(&s, ReduceTo::Avg), Some(4.0));
        assert_eq!(reduce(&s, ReduceTo::Last), Some(6.0));
        assert_eq!(reduce(&s, ReduceTo::Sum), Some(12.0));
        assert_eq!(reduce(&s, ReduceTo::Min), Some(2.0));
        assert_eq!(reduce(&s, ReduceTo::Max), Some(6.0));
        assert_eq!(reduce(&[], ReduceTo::Avg), None);
    }

    #[test]
    fn test_time_buckets() {
        let s = samples(&[(0, 1.0), (30_000, 3.0), (60_000, 5.0), (90_000, 5.0)]);
        let w = window(60);

        assert_eq!(
            aggregate_time(&s, &w, TimeAggregation::Avg, Temporality::Unspecified),
            samples(&[(0, 2.0), (60_000, 5.0)])
        );
        assert_eq!(
            aggregate_time(&s, &w, TimeAggregation::Latest, Temporality::Unspecified),
            samples(&[(0, 3.0), (60_000, 5.0)])
        );
        assert_eq!(
            aggregate_time(&s, &w, TimeAggregation::CountDistinct, Temporality::Unspecified),
            samples(&[(0, 2.0), (60_000, 1.0)])
        );
    }

    #[test]
    fn test_samples_outside_range_ignored() {
        let s = samples(&[(-10, 100.0), (10, 1.0), (700_000, 100.0)]);
        assert_eq!(
            aggregate_time(&s, &window(60), TimeAggregation::Sum, Temporality::Unspecified),
            samples(&[(0, 1.0)])
        );
    }

    #[test]
    fn test_cumulative_rate_with_reset() {
        let s = samples(&[(0, 10.0), (30_000, 20.0), (60_000, 40.0), (90_000, 5.0)]);
        let w = window(60);

        let increase = aggregate_time(&s, &w, TimeAggregation::Increase, Temporality::Cumulative);
        assert_eq!(increase, samples(&[(0, 10.0), (60_000, 25.0)]));

        let rate = aggregate_time(&s, &w, TimeAggregation::Rate, Temporality::Cumulative);
        assert_eq!(rate.len(), 2);
        assert!((rate[0].value - 10.0 / 60.0).abs() < 1e-12);
        assert!((rate[1].value - 25.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_delta_rate() {
        let s = samples(&[(0, 6.0), (30_000, 6.0)]);
        let rate = aggregate_time(&s, &window(60), TimeAggregation::Rate, Temporality::Delta);
        assert_eq!(rate, samples(&[(0, 0.2)]));
    }

    #[test]
    fn test_space_aggregation() {
        let series = vec![
            samples(&[(0, 1.0), (60_000, 2.0)]),
            samples(&[(0, 3.0)]),
        ];
        assert_eq!(
            aggregate_space(&series, SpaceAggregation::Sum),
            samples(&[(0, 4.0), (60_000, 2.0)])
        );
        assert_eq!(
            aggregate_space(&series, SpaceAggregation::Count),
            samples(&[(0, 2.0), (60_000, 1.0)])
        );
        assert_eq!(
            aggregate_space(&series, SpaceAggregation::Avg),
            samples(&[(0, 2.0), (60_000, 2.0)])
        );
    }

    #[test]
    fn test_merge_states() {
        let mut a = AggregateState::new();
        a.add(10, 1.0);
        let mut b = AggregateState::new();
        b.add(5, 7.0);
        b.add(20, 3.0);
        a.merge(&b);

        assert_eq!(a.count(), 3);
        assert_eq!(a.finalize_reduce(ReduceTo::Last), Some(3.0));
        assert_eq!(a.finalize_reduce(ReduceTo::Max), Some(7.0));
        assert_eq!(a.finalize_space(SpaceAggregation::Sum), Some(11.0));
    }

    #[test]
    fn test_latest_tracks_timestamp_not_insertion_order() {
        let mut state = AggregateState::new();
        state.add(30, 3.0);
        state.add(10, 1.0);
        assert_eq!(state.finalize_time(TimeAggregation::Latest), Some(3.0));

        let mut older = AggregateState::new();
        older.add(20, 2.0);
        state.merge(&older);
        assert_eq!(state.finalize_reduce(ReduceTo::Last), Some(3.0));
    }
}

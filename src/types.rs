//! Core data types shared across the engine
//!
//! # Key Types
//!
//! - **`TimeRange`**: Query window in milliseconds (start, end)
//! - **`Sample`**: A single `(timestamp, value)` pair of a series
//! - **`EvalWindow`**: Time range plus the step interval handed to the store
//!
//! # Example
//!
//! ```rust
//! use kuba_compose::types::{Sample, TimeRange};
//!
//! let range = TimeRange::new(1000, 2000).unwrap();
//! assert!(range.contains(1500));
//!
//! let sample = Sample::new(1500, 42.5);
//! assert_eq!(sample.value, 42.5);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ValidationError;

/// Time range for a query, in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp in milliseconds (inclusive)
    pub start: i64,

    /// End timestamp in milliseconds (inclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range with validation
    ///
    /// A range must have `start < end`; an empty window cannot be stepped.
    ///
    /// ```rust
    /// use kuba_compose::types::TimeRange;
    ///
    /// assert!(TimeRange::new(1000, 2000).is_ok());
    /// assert!(TimeRange::new(2000, 1000).is_err());
    /// ```
    pub fn new(start: i64, end: i64) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Duration of the range in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

/// A single sample of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in milliseconds
    pub timestamp: i64,

    /// Sample value
    #[serde(with = "float_repr")]
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Sample {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// Wire form of a float: finite values as JSON numbers, the rest as
/// `"NaN"`, `"+Inf"` or `"-Inf"` since JSON has no literal for them
pub(crate) mod float_repr {
    use serde::de::{self, Deserialize, Deserializer};
    use serde::ser::Serializer;

    pub(crate) fn non_finite_text(value: f64) -> &'static str {
        if value.is_nan() {
            "NaN"
        } else if value > 0.0 {
            "+Inf"
        } else {
            "-Inf"
        }
    }

    pub(crate) fn parse_non_finite(text: &str) -> Option<f64> {
        match text {
            "NaN" => Some(f64::NAN),
            "+Inf" => Some(f64::INFINITY),
            "-Inf" => Some(f64::NEG_INFINITY),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(non_finite_text(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(v),
            Raw::Text(s) => parse_non_finite(&s)
                .ok_or_else(|| de::Error::custom(format!("expected a number, got \"{}\"", s))),
        }
    }
}

/// Evaluation window handed to the store adapter for one builder query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalWindow {
    /// Queried time range
    pub range: TimeRange,

    /// Step interval used for time aggregation buckets
    pub step: Duration,
}

impl EvalWindow {
    /// Create a new evaluation window
    pub fn new(range: TimeRange, step: Duration) -> Self {
        Self { range, step }
    }

    /// Step in milliseconds (at least 1)
    pub fn step_ms(&self) -> i64 {
        (self.step.as_millis() as i64).max(1)
    }

    /// Start of the step bucket containing `timestamp`
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        let step = self.step_ms();
        timestamp - timestamp.rem_euclid(step)
    }
}

/// Sort samples by timestamp and collapse duplicate timestamps (last wins)
pub fn normalize_samples(samples: &mut Vec<Sample>) {
    samples.sort_by_key(|s| s.timestamp);
    let mut out: Vec<Sample> = Vec::with_capacity(samples.len());
    for sample in samples.drain(..) {
        match out.last_mut() {
            Some(last) if last.timestamp == sample.timestamp => *last = sample,
            _ => out.push(sample),
        }
    }
    *samples = out;
}

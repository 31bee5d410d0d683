//! Builder queries
//!
//! A [`BuilderQuery`] is one named sub-query against the metrics store: a metric,
//! a filter set, group-by dimensions and the two aggregation stages the store
//! applies (time aggregation per raw series, then space aggregation across raw
//! series sharing a group-by key). `reduce_to` is only used for table output.
//!
//! # Example
//!
//! ```rust
//! use kuba_compose::query::{
//!     AttributeKey, BuilderQuery, FilterItem, FilterSet, SpaceAggregation, TimeAggregation,
//! };
//!
//! let query = BuilderQuery::new("A", "system_cpu_time")
//!     .with_filters(FilterSet::and(vec![
//!         FilterItem::not_equal(AttributeKey::tag("state"), "idle").unwrap(),
//!     ]))
//!     .group_by(AttributeKey::resource("host_name"))
//!     .with_time_aggregation(TimeAggregation::Rate)
//!     .with_space_aggregation(SpaceAggregation::Sum)
//!     .disabled(true);
//!
//! assert!(query.validate().is_ok());
//! assert!(query.disabled);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::attribute::AttributeKey;
use super::filter::FilterSet;
use crate::error::ValidationError;

// ============================================================================
// Aggregation Enums
// ============================================================================

/// How a metric's samples accumulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Temporality {
    /// Monotonic counter since process start
    Cumulative,
    /// Each sample is the change since the previous one
    Delta,
    /// Gauge or unknown
    #[default]
    Unspecified,
}

/// Reduction applied within each raw series per step interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAggregation {
    /// Last sample in the step
    Latest,
    /// Sum of samples
    Sum,
    /// Mean of samples
    Avg,
    /// Minimum sample
    Min,
    /// Maximum sample
    Max,
    /// Number of samples
    Count,
    /// Number of distinct sample values
    CountDistinct,
    /// Per-second increase
    Rate,
    /// Total increase
    Increase,
}

impl TimeAggregation {
    /// Whether the function looks at consecutive samples rather than single values
    pub fn is_counter_function(&self) -> bool {
        matches!(self, TimeAggregation::Rate | TimeAggregation::Increase)
    }
}

/// Reduction applied across raw series sharing a series key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceAggregation {
    /// Sum across series
    Sum,
    /// Mean across series
    Avg,
    /// Minimum across series
    Min,
    /// Maximum across series
    Max,
    /// Number of contributing series
    Count,
}

/// Scalar reduction of a whole series for table output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReduceTo {
    /// Last sample
    Last,
    /// Sum of samples
    Sum,
    /// Mean of samples
    #[default]
    Avg,
    /// Minimum sample
    Min,
    /// Maximum sample
    Max,
}

impl fmt::Display for ReduceTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceTo::Last => write!(f, "last"),
            ReduceTo::Sum => write!(f, "sum"),
            ReduceTo::Avg => write!(f, "avg"),
            ReduceTo::Min => write!(f, "min"),
            ReduceTo::Max => write!(f, "max"),
        }
    }
}

// ============================================================================
// Builder Query
// ============================================================================

/// A single named sub-query against the metrics store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderQuery {
    /// Unique name within the composite query
    #[serde(rename = "queryName")]
    pub name: String,

    /// Metric being aggregated
    #[serde(rename = "aggregateAttribute")]
    pub metric: AttributeKey,

    /// Counter semantics of the metric
    #[serde(default)]
    pub temporality: Temporality,

    /// Series selection
    #[serde(default)]
    pub filters: FilterSet,

    /// Dimensions of the output series key, in display order
    #[serde(default)]
    pub group_by: Vec<AttributeKey>,

    /// Per-series reduction over each step
    pub time_aggregation: TimeAggregation,

    /// Cross-series reduction per series key
    pub space_aggregation: SpaceAggregation,

    /// Table-mode scalar reduction
    #[serde(default)]
    pub reduce_to: ReduceTo,

    /// Computed and usable as an operand, but never surfaced on its own
    #[serde(default)]
    pub disabled: bool,

    /// Display label
    #[serde(default)]
    pub legend: String,

    /// Step interval in seconds (falls back to the request step)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_interval: Option<u64>,
}

impl BuilderQuery {
    /// Create a query for a metric with `avg`/`sum` aggregation and no filters
    pub fn new(name: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric: AttributeKey::metric(metric),
            temporality: Temporality::Unspecified,
            filters: FilterSet::empty(),
            group_by: Vec::new(),
            time_aggregation: TimeAggregation::Avg,
            space_aggregation: SpaceAggregation::Sum,
            reduce_to: ReduceTo::Avg,
            disabled: false,
            legend: String::new(),
            step_interval: None,
        }
    }

    /// Set the temporality
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Set the filter set
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Append a group-by dimension
    pub fn group_by(mut self, key: AttributeKey) -> Self {
        self.group_by.push(key);
        self
    }

    /// Set the time aggregation
    pub fn with_time_aggregation(mut self, aggregation: TimeAggregation) -> Self {
        self.time_aggregation = aggregation;
        self
    }

    /// Set the space aggregation
    pub fn with_space_aggregation(mut self, aggregation: SpaceAggregation) -> Self {
        self.space_aggregation = aggregation;
        self
    }

    /// Set the table reduction
    pub fn with_reduce_to(mut self, reduce_to: ReduceTo) -> Self {
        self.reduce_to = reduce_to;
        self
    }

    /// Mark as operand-only
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set the legend
    pub fn with_legend(mut self, legend: impl Into<String>) -> Self {
        self.legend = legend.into();
        self
    }

    /// Set the step interval in seconds
    pub fn with_step_interval(mut self, seconds: u64) -> Self {
        self.step_interval = Some(seconds);
        self
    }

    /// Check the query on its own (names are checked by the composite query)
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metric.name.trim().is_empty() {
            return Err(ValidationError::MissingMetric(self.name.clone()));
        }

        // Series keys are name keyed, so scopes cannot share a dimension name
        let mut seen = HashSet::new();
        for key in &self.group_by {
            if !seen.insert(key.name.as_str()) {
                return Err(ValidationError::DuplicateGroupBy {
                    query: self.name.clone(),
                    key: key.to_string(),
                });
            }
        }

        if self.step_interval == Some(0) {
            return Err(ValidationError::InvalidStep(self.name.clone()));
        }

        Ok(())
    }
}

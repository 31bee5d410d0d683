//! Range query requests

use serde::{Deserialize, Serialize};

use super::composite::CompositeQuery;
use crate::error::ValidationError;
use crate::types::TimeRange;

/// Response schema version requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Legacy shape
    V3,
    /// Current shape
    #[default]
    V4,
}

/// A composite query evaluated over a time range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeRequest {
    /// Range start in milliseconds
    pub start: i64,

    /// Range end in milliseconds
    pub end: i64,

    /// Step interval in seconds for builder queries without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,

    /// Queries to evaluate
    pub composite_query: CompositeQuery,

    /// Response schema version
    #[serde(default)]
    pub version: SchemaVersion,

    /// Flatten table panels into rows
    #[serde(default)]
    pub format_for_web: bool,
}

impl QueryRangeRequest {
    /// Create a request over `range`
    pub fn new(composite_query: CompositeQuery, range: TimeRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
            step: None,
            composite_query,
            version: SchemaVersion::default(),
            format_for_web: false,
        }
    }

    /// Set the default step in seconds
    pub fn with_step(mut self, seconds: u64) -> Self {
        self.step = Some(seconds);
        self
    }

    /// Set the schema version
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Request table rows for table panels
    pub fn format_for_web(mut self, enabled: bool) -> Self {
        self.format_for_web = enabled;
        self
    }

    /// Validated time range
    pub fn time_range(&self) -> Result<TimeRange, ValidationError> {
        TimeRange::new(self.start, self.end)
    }

    /// Check the request fields that are not part of the composite query
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.time_range()?;
        if self.step == Some(0) {
            return Err(ValidationError::InvalidStep("request".to_string()));
        }
        Ok(())
    }
}

//! Error types for the composite query engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// The composite query or request is malformed or inconsistent
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store adapter failed while evaluating a builder query
    #[error("Store error for query '{query}': {source}")]
    Store {
        /// Name of the builder query whose evaluation failed
        query: String,
        /// Error reported by the store adapter
        #[source]
        source: StoreError,
    },

    /// The request was cancelled by the caller or exceeded its deadline
    #[error("Query canceled: {reason}")]
    Canceled {
        /// Why evaluation stopped
        reason: CancelReason,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (worker panic, broken invariant)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Attach the failing query name to a store error
    pub fn store(query: impl Into<String>, source: StoreError) -> Self {
        Error::Store {
            query: query.into(),
            source,
        }
    }

    /// Error type string used by the response layer
    pub fn api_error_type(&self) -> ApiErrorType {
        match self {
            Error::Validation(_) | Error::Serialization(_) => ApiErrorType::BadData,
            Error::Store { source, .. } => match source {
                StoreError::Timeout(_) => ApiErrorType::Timeout,
                StoreError::Unavailable(_) => ApiErrorType::Unavailable,
                StoreError::BadData(_) => ApiErrorType::BadData,
                StoreError::Other(_) => ApiErrorType::Execution,
            },
            Error::Canceled { .. } => ApiErrorType::Canceled,
            Error::Configuration(_) | Error::Io(_) | Error::Internal(_) => ApiErrorType::Internal,
        }
    }

    /// Whether this error was raised before any store call was issued
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Why a request stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled (client disconnect, shutdown)
    Caller,
    /// The configured request deadline elapsed
    Timeout,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Caller => write!(f, "cancelled by caller"),
            CancelReason::Timeout => write!(f, "deadline exceeded"),
        }
    }
}

/// Error categories surfaced to API consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorType {
    /// Request could not be evaluated as given
    BadData,
    /// Store did not answer in time
    Timeout,
    /// Store is unreachable
    Unavailable,
    /// Request was cancelled
    Canceled,
    /// Store failed while executing
    Execution,
    /// Bug or misconfiguration
    Internal,
}

impl ApiErrorType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorType::BadData => "bad_data",
            ApiErrorType::Timeout => "timeout",
            ApiErrorType::Unavailable => "unavailable",
            ApiErrorType::Canceled => "canceled",
            ApiErrorType::Execution => "execution",
            ApiErrorType::Internal => "internal",
        }
    }
}

/// Validation errors
///
/// Raised while building or planning a composite query. Always detected before
/// any store call and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Composite query contains no entries
    #[error("Composite query has no queries")]
    EmptyComposite,

    /// Two entries share the same name
    #[error("Duplicate query name: {0}")]
    DuplicateName(String),

    /// Map key and entry name disagree
    #[error("Query registered as '{key}' is named '{name}'")]
    NameMismatch {
        /// Key in the composite map
        key: String,
        /// Name carried by the entry
        name: String,
    },

    /// Name is not a valid identifier
    #[error("Invalid query name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidName(String),

    /// Formula references a name that does not exist
    #[error("Formula '{formula}' references unknown query '{reference}'")]
    UnknownReference {
        /// Formula being resolved
        formula: String,
        /// Missing name
        reference: String,
    },

    /// Formula references itself
    #[error("Formula '{0}' references itself")]
    SelfReference(String),

    /// Formula references form a cycle
    #[error("Formula reference cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// Expression failed to parse
    #[error("Invalid expression for '{formula}': {message}")]
    Syntax {
        /// Formula being parsed
        formula: String,
        /// Description of the parse failure
        message: String,
    },

    /// Expression does not reference any query
    #[error("Formula '{0}' must reference at least one query")]
    NoReferences(String),

    /// Operator not valid for the key's declared type
    #[error("Operator '{operator}' is not valid for {data_type} attribute '{key}'")]
    IncompatibleOperator {
        /// Attribute name
        key: String,
        /// Operator wire form
        operator: String,
        /// Declared data type
        data_type: String,
    },

    /// Filter literal does not fit the operator or the key's declared type
    #[error("Invalid value for filter on '{key}' ({operator}): {message}")]
    InvalidFilterValue {
        /// Attribute name
        key: String,
        /// Operator wire form
        operator: String,
        /// What is wrong with the value
        message: String,
    },

    /// Group-by list repeats an attribute
    #[error("Query '{query}' groups by '{key}' more than once")]
    DuplicateGroupBy {
        /// Builder query name
        query: String,
        /// Repeated attribute
        key: String,
    },

    /// Builder query has no metric name
    #[error("Query '{0}' has no metric name")]
    MissingMetric(String),

    /// Only builder composite queries are evaluated here
    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(String),

    /// Time range start is after end
    #[error("Invalid time range: start {start} must be before end {end}")]
    InvalidTimeRange {
        /// Start timestamp (ms)
        start: i64,
        /// End timestamp (ms)
        end: i64,
    },

    /// Step interval is zero
    #[error("Step interval for '{0}' must be greater than zero")]
    InvalidStep(String),
}

/// Store adapter errors
///
/// Propagated verbatim (with the failing query name attached by the engine).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Store did not answer in time
    #[error("Store timeout: {0}")]
    Timeout(String),

    /// Store is unreachable or overloaded
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store returned data the engine cannot use
    #[error("Bad data from store: {0}")]
    BadData(String),

    /// Any other adapter failure
    #[error("Store failure: {0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_store_error_carries_query_name() {
        let err = Error::store("A", StoreError::Unavailable("connection refused".into()));
        let msg = err.to_string();
        assert!(msg.contains("'A'"));
        assert!(msg.contains("connection refused"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_api_error_types() {
        assert_eq!(
            Error::from(ValidationError::EmptyComposite).api_error_type(),
            ApiErrorType::BadData
        );
        assert_eq!(
            Error::store("B", StoreError::Timeout("5s".into())).api_error_type(),
            ApiErrorType::Timeout
        );
        assert_eq!(
            Error::Canceled {
                reason: CancelReason::Caller
            }
            .api_error_type()
            .as_str(),
            "canceled"
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = ValidationError::Cycle(vec!["F1".into(), "F2".into(), "F1".into()]);
        assert_eq!(err.to_string(), "Formula reference cycle: F1 -> F2 -> F1");
    }
}

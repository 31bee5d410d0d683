//! Kuba Compose - composite metric query engine
//!
//! This library evaluates declarative, multi-part metric queries:
//! - Named builder queries over a pluggable metrics store, with typed
//!   tag/resource filters and two-stage (time, then space) aggregation
//! - Formula queries combining their results with `+ - * /`, aligned by
//!   group-by key and timestamp
//! - Bounded, cancellable fan-out of store calls
//! - Series or flattened table output with per-query reductions
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kuba_compose::query::{
//!     AttributeKey, BuilderQuery, CompositeQuery, FormulaQuery, Labels, PanelType,
//!     QueryEngine, QueryRangeRequest,
//! };
//! use kuba_compose::store::InMemoryStore;
//! use kuba_compose::types::{Sample, TimeRange};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kuba_compose::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! store.add_series("used", Labels::new().with_resource("host_name", "web-1"), vec![Sample::new(0, 80.0)]);
//! store.add_series("total", Labels::new().with_resource("host_name", "web-1"), vec![Sample::new(0, 100.0)]);
//!
//! let host = AttributeKey::resource("host_name");
//! let composite = CompositeQuery::builder()
//!     .builder_query(BuilderQuery::new("A", "used").group_by(host.clone()).disabled(true))
//!     .builder_query(BuilderQuery::new("B", "total").group_by(host).disabled(true))
//!     .formula(FormulaQuery::new("F1", "A/B"))
//!     .panel_type(PanelType::Table)
//!     .build()?;
//!
//! let request = QueryRangeRequest::new(composite, TimeRange::new(0, 60_000)?).format_for_web(true);
//! let response = QueryEngine::default()
//!     .execute(&request, store, &CancellationToken::new())
//!     .await?;
//!
//! assert_eq!(response.rows().unwrap()[0].values["F1"].as_f64(), Some(0.8));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Prometheus metrics
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod telemetry;

/// Two-stage (time, then space) aggregation and table reductions
pub mod aggregation;

/// Store adapter interface and the in-memory reference store
pub mod store;

/// Composite query model, planning, evaluation and formatting
pub mod query;

// Re-export main types
pub use config::{Config, EngineConfig};
pub use error::{Error, Result, StoreError, ValidationError};
pub use query::{CompositeQuery, QueryEngine, QueryRangeRequest, QueryResponse};
pub use store::{SeriesKey, SeriesResult, SeriesStore};
pub use types::{Sample, TimeRange};

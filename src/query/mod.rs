//! Composite query model and execution
//!
//! A composite query is a set of named sub-queries. Builder queries are
//! evaluated by the store; formula queries combine their results with
//! arithmetic expressions. The engine plans, evaluates and formats them:
//!
//! ```text
//! CompositeQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Plan     │  names, filters, expressions, cycles, pruning
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Dispatch   │  builder queries → SeriesStore (bounded, cancellable)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Formulas   │  topological order, inner join on series key + timestamp
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Format    │  series or table (reduce-to, "n/a" for missing)
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use kuba_compose::query::{BuilderQuery, CompositeQuery, FormulaQuery, PanelType};
//!
//! let composite = CompositeQuery::builder()
//!     .builder_query(BuilderQuery::new("A", "system_memory_usage").disabled(true))
//!     .builder_query(BuilderQuery::new("B", "system_memory_total").disabled(true))
//!     .formula(FormulaQuery::new("F1", "A / B * 100").with_legend("Memory (%)"))
//!     .panel_type(PanelType::Table)
//!     .build()
//!     .unwrap();
//!
//! let plan = composite.plan().unwrap();
//! assert_eq!(plan.surfaced(), &["F1".to_string()]);
//! ```

pub mod attribute;
pub mod builder;
pub mod composite;
pub mod evaluator;
pub mod executor;
pub mod expression;
pub mod filter;
pub mod planner;
pub mod presets;
pub mod request;
pub mod result;

pub use attribute::{AttributeDataType, AttributeKey, AttributeScope, AttributeValue, Labels};
pub use builder::{BuilderQuery, ReduceTo, SpaceAggregation, Temporality, TimeAggregation};
pub use composite::{
    CompositeQuery, CompositeQueryBuilder, FormulaQuery, PanelType, QueryEntry, QueryType,
};
pub use executor::QueryEngine;
pub use expression::{parse_expression, BinaryOp, Expr};
pub use filter::{BoolOperator, FilterItem, FilterOperator, FilterSet, FilterValue};
pub use planner::{PlannedFormula, QueryPlan};
pub use request::{QueryRangeRequest, SchemaVersion};
pub use result::{
    Label, QueryResponse, QuerySeries, ReducedValue, ResultData, ResultFormatter, SeriesOutput,
    TableColumn, TableRow, NO_DATA,
};

//! Two-stage aggregation
//!
//! Builder queries are evaluated in two phases: a time aggregation reduces each
//! raw series within every step bucket, then a space aggregation merges the
//! raw series that share a group-by key.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Raw series (filtered)       │
//! │  metric + tag/resource labels       │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │          Time aggregation           │
//! │  per series, per step bucket        │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │         Space aggregation           │
//! │  per group-by key, per bucket       │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │        Series per group-by key      │
//! └─────────────────────────────────────┘
//! ```
//!
//! The same [`AggregateState`] also backs table reductions ([`reduce`]).

mod space_time;

pub use space_time::{aggregate_space, aggregate_time, reduce, AggregateState};

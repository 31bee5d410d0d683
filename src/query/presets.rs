//! Predefined infrastructure table queries
//!
//! The host list and process list tables are composite queries like any
//! other: disabled builder queries feeding ratio formulas, rendered as table
//! panels with one row per host (or process).

use super::attribute::AttributeKey;
use super::builder::{BuilderQuery, SpaceAggregation, Temporality, TimeAggregation};
use super::composite::{CompositeQuery, FormulaQuery, PanelType};
use super::filter::{FilterItem, FilterSet};
use super::request::{QueryRangeRequest, SchemaVersion};
use crate::error::ValidationError;
use crate::types::TimeRange;

/// Hosts running the collector agent itself are hidden from the host list
const AGENT_HOST_MARKER: &str = "k8s-infra-otel-agent";

fn host_query(
    name: &str,
    metric: &str,
    temporality: Temporality,
    time_aggregation: TimeAggregation,
    mut filters: Vec<FilterItem>,
) -> Result<BuilderQuery, ValidationError> {
    filters.push(FilterItem::not_contains(
        AttributeKey::resource("host_name"),
        AGENT_HOST_MARKER,
    )?);
    Ok(BuilderQuery::new(name, metric)
        .with_temporality(temporality)
        .with_filters(FilterSet::and(filters))
        .group_by(AttributeKey::resource("host_name"))
        .group_by(AttributeKey::resource("os_type"))
        .with_time_aggregation(time_aggregation)
        .with_space_aggregation(SpaceAggregation::Sum)
        .disabled(true))
}

/// Host list: CPU usage, memory usage, CPU wait and 15m load average per host
pub fn host_list_query() -> Result<CompositeQuery, ValidationError> {
    use Temporality::{Cumulative, Unspecified};
    use TimeAggregation::{Avg, Rate};

    let state = AttributeKey::tag("state");

    CompositeQuery::builder()
        .builder_query(host_query(
            "A",
            "system_cpu_time",
            Cumulative,
            Rate,
            vec![FilterItem::not_equal(state.clone(), "idle")?],
        )?)
        .builder_query(host_query("B", "system_cpu_time", Cumulative, Rate, vec![])?)
        .formula(FormulaQuery::new("F1", "A/B").with_legend("CPU Usage (%)"))
        .builder_query(host_query(
            "C",
            "system_memory_usage",
            Cumulative,
            Avg,
            vec![FilterItem::in_list(state.clone(), ["used", "cached"])?],
        )?)
        .builder_query(host_query("D", "system_memory_usage", Cumulative, Avg, vec![])?)
        .formula(FormulaQuery::new("F2", "C/D").with_legend("Memory Usage (%)"))
        .builder_query(host_query(
            "E",
            "system_cpu_time",
            Cumulative,
            Rate,
            vec![FilterItem::equal(state, "wait")?],
        )?)
        .builder_query(host_query("F", "system_cpu_time", Cumulative, Rate, vec![])?)
        .formula(FormulaQuery::new("F3", "E/F").with_legend("CPU Wait Time (%)"))
        .builder_query(
            host_query("G", "system_cpu_load_average_15m", Unspecified, Avg, vec![])?
                .disabled(false)
                .with_legend("CPU Load Average (15m)"),
        )
        .panel_type(PanelType::Table)
        .build()
}

/// Process list: CPU usage and memory usage per process
pub fn process_list_query() -> Result<CompositeQuery, ValidationError> {
    let pid = AttributeKey::resource("process_pid");

    CompositeQuery::builder()
        .builder_query(
            BuilderQuery::new("A", "process_cpu_time")
                .with_temporality(Temporality::Cumulative)
                .group_by(pid.clone())
                .with_time_aggregation(TimeAggregation::Rate)
                .with_space_aggregation(SpaceAggregation::Sum)
                .disabled(true),
        )
        .formula(FormulaQuery::new("F1", "A").with_legend("Process CPU Usage (%)"))
        .builder_query(
            BuilderQuery::new("C", "process_memory_usage")
                .with_temporality(Temporality::Cumulative)
                .group_by(pid)
                .with_time_aggregation(TimeAggregation::Avg)
                .with_space_aggregation(SpaceAggregation::Sum),
        )
        .panel_type(PanelType::Table)
        .build()
}

/// Table request for the host list over `range`
pub fn host_list_request(range: TimeRange) -> Result<QueryRangeRequest, ValidationError> {
    Ok(table_request(host_list_query()?, range))
}

/// Table request for the process list over `range`
pub fn process_list_request(range: TimeRange) -> Result<QueryRangeRequest, ValidationError> {
    Ok(table_request(process_list_query()?, range))
}

fn table_request(composite: CompositeQuery, range: TimeRange) -> QueryRangeRequest {
    QueryRangeRequest::new(composite, range)
        .with_version(SchemaVersion::V4)
        .format_for_web(true)
}

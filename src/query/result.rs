//! Query responses and result formatting
//!
//! A [`QueryResponse`] is either a list of series per surfaced query
//! (`resultType: "series"`) or a flattened table (`resultType: "table"`) with
//! one row per distinct series key and one value column per surfaced query.
//! Missing values in a table are [`ReducedValue::NoData`], serialized as `"n/a"`.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::composite::{CompositeQuery, PanelType};
use super::planner::QueryPlan;
use super::request::SchemaVersion;
use crate::aggregation::reduce;
use crate::store::{SeriesKey, SeriesResult};
use crate::types::{float_repr, Sample};

// ============================================================================
// Reduced Values
// ============================================================================

/// Wire form of a missing table value
pub const NO_DATA: &str = "n/a";

/// A table cell: a reduced scalar or the no-data sentinel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReducedValue {
    /// Reduced scalar
    Value(f64),
    /// No samples for this key and query
    NoData,
}

impl ReducedValue {
    /// Scalar value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReducedValue::Value(v) => Some(*v),
            ReducedValue::NoData => None,
        }
    }

    /// Whether this is the no-data sentinel
    pub fn is_no_data(&self) -> bool {
        matches!(self, ReducedValue::NoData)
    }
}

impl From<Option<f64>> for ReducedValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(ReducedValue::NoData, ReducedValue::Value)
    }
}

impl fmt::Display for ReducedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducedValue::Value(v) => write!(f, "{}", v),
            ReducedValue::NoData => write!(f, "{}", NO_DATA),
        }
    }
}

impl Serialize for ReducedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReducedValue::Value(v) => float_repr::serialize(v, serializer),
            ReducedValue::NoData => serializer.serialize_str(NO_DATA),
        }
    }
}

impl<'de> Deserialize<'de> for ReducedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(ReducedValue::Value(v)),
            Raw::Text(s) if s == NO_DATA => Ok(ReducedValue::NoData),
            Raw::Text(s) => float_repr::parse_non_finite(&s)
                .map(ReducedValue::Value)
                .ok_or_else(|| {
                    de::Error::custom(format!(
                        "expected a number or \"{}\", got \"{}\"",
                        NO_DATA, s
                    ))
                }),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// A group-by dimension value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Dimension name
    pub name: String,
    /// Dimension value
    pub value: String,
}

/// One output series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOutput {
    /// Group-by values in group-by order
    pub labels: Vec<Label>,
    /// Samples sorted by timestamp
    pub values: Vec<Sample>,
}

impl SeriesOutput {
    fn from_result(result: &SeriesResult, values: Vec<Sample>) -> Self {
        Self {
            labels: result
                .key
                .pairs()
                .map(|(name, value)| Label {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            values,
        }
    }

    /// Series key of this output
    pub fn key(&self) -> SeriesKey {
        SeriesKey::from_pairs(self.labels.iter().map(|l| (l.name.clone(), l.value.clone())))
    }
}

/// All series of one surfaced query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySeries {
    /// Query name
    pub query_name: String,
    /// Display label
    pub legend: String,
    /// Output series
    pub series: Vec<SeriesOutput>,
}

/// A table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    /// Group dimension or query name
    pub name: String,
    /// Query feeding a value column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    /// Display label of a value column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
    /// Whether the column holds reduced values
    pub is_value_column: bool,
}

/// A table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Group-by values by dimension
    pub groups: BTreeMap<String, String>,
    /// Reduced value by query name
    pub values: BTreeMap<String, ReducedValue>,
}

/// Response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", rename_all = "lowercase")]
pub enum ResultData {
    /// Series per surfaced query
    Series {
        /// Surfaced queries in name order
        series: Vec<QuerySeries>,
    },
    /// Flattened table
    Table {
        /// Group columns then value columns
        columns: Vec<TableColumn>,
        /// Rows sorted by group values
        rows: Vec<TableRow>,
    },
}

/// Result of a range query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Payload
    #[serde(flatten)]
    pub data: ResultData,

    /// Display unit of the composite query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Schema version
    pub version: SchemaVersion,
}

impl QueryResponse {
    /// Series payload, if this is a series response
    pub fn series(&self) -> Option<&[QuerySeries]> {
        match &self.data {
            ResultData::Series { series } => Some(series),
            ResultData::Table { .. } => None,
        }
    }

    /// Rows, if this is a table response
    pub fn rows(&self) -> Option<&[TableRow]> {
        match &self.data {
            ResultData::Table { rows, .. } => Some(rows),
            ResultData::Series { .. } => None,
        }
    }

    /// Columns, if this is a table response
    pub fn columns(&self) -> Option<&[TableColumn]> {
        match &self.data {
            ResultData::Table { columns, .. } => Some(columns),
            ResultData::Series { .. } => None,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Shapes evaluated results into a [`QueryResponse`]
#[derive(Debug)]
pub struct ResultFormatter<'a> {
    composite: &'a CompositeQuery,
    plan: &'a QueryPlan,
}

impl<'a> ResultFormatter<'a> {
    /// Create a formatter for a planned composite query
    pub fn new(composite: &'a CompositeQuery, plan: &'a QueryPlan) -> Self {
        Self { composite, plan }
    }

    /// Format the results of every surfaced query
    ///
    /// Table panels become rows only when `format_for_web` is set; otherwise
    /// each series is reduced to a single point.
    pub fn format(
        &self,
        results: &BTreeMap<String, Vec<SeriesResult>>,
        format_for_web: bool,
        version: SchemaVersion,
    ) -> QueryResponse {
        let data = match (self.composite.panel_type, format_for_web) {
            (PanelType::Table, true) => self.table(results),
            (PanelType::Table, false) => self.series(results, true),
            _ => self.series(results, false),
        };
        QueryResponse {
            data,
            unit: self.composite.unit.clone(),
            version,
        }
    }

    fn legend(&self, name: &str) -> String {
        self.composite
            .get(name)
            .map(|entry| entry.legend().to_string())
            .unwrap_or_default()
    }

    fn surfaced<'r>(
        &self,
        results: &'r BTreeMap<String, Vec<SeriesResult>>,
    ) -> impl Iterator<Item = (&'a str, &'r [SeriesResult])> {
        let plan: &'a QueryPlan = self.plan;
        plan.surfaced().iter().map(move |name| {
            let series = results.get(name).map(Vec::as_slice).unwrap_or(&[]);
            (name.as_str(), series)
        })
    }

    fn series(&self, results: &BTreeMap<String, Vec<SeriesResult>>, reduced: bool) -> ResultData {
        let series = self
            .surfaced(results)
            .map(|(name, series)| {
                let reduce_to = self.plan.reduce_to(name);
                QuerySeries {
                    query_name: name.to_string(),
                    legend: self.legend(name),
                    series: series
                        .iter()
                        .map(|s| {
                            let values = if reduced {
                                match (s.last_timestamp(), reduce(&s.samples, reduce_to)) {
                                    (Some(ts), Some(v)) => vec![Sample::new(ts, v)],
                                    _ => Vec::new(),
                                }
                            } else {
                                s.samples.clone()
                            };
                            SeriesOutput::from_result(s, values)
                        })
                        .collect(),
                }
            })
            .collect();
        ResultData::Series { series }
    }

    fn table(&self, results: &BTreeMap<String, Vec<SeriesResult>>) -> ResultData {
        let surfaced: Vec<(&str, HashMap<&SeriesKey, &SeriesResult>)> = self
            .surfaced(results)
            .map(|(name, series)| (name, series.iter().map(|s| (&s.key, s)).collect()))
            .collect();

        let mut columns: Vec<TableColumn> = Vec::new();
        let mut keys: BTreeSet<&SeriesKey> = BTreeSet::new();
        for (_, by_key) in &surfaced {
            for key in by_key.keys() {
                keys.insert(*key);
            }
        }
        // Dimension columns in first-seen order across surfaced queries
        for (name, _) in &surfaced {
            let Some(series) = results.get(*name) else {
                continue;
            };
            for s in series {
                for dimension in s.key.dimensions() {
                    if !columns.iter().any(|c| c.name == dimension) {
                        columns.push(TableColumn {
                            name: dimension.to_string(),
                            query_name: None,
                            legend: None,
                            is_value_column: false,
                        });
                    }
                }
            }
        }
        for (name, _) in &surfaced {
            columns.push(TableColumn {
                name: name.to_string(),
                query_name: Some(name.to_string()),
                legend: Some(self.legend(name)),
                is_value_column: true,
            });
        }

        let rows = keys
            .into_iter()
            .map(|key| TableRow {
                groups: key
                    .pairs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                values: surfaced
                    .iter()
                    .map(|(name, by_key)| {
                        let value = by_key
                            .get(key)
                            .and_then(|s| reduce(&s.samples, self.plan.reduce_to(name)));
                        (name.to_string(), ReducedValue::from(value))
                    })
                    .collect(),
            })
            .collect();

        ResultData::Table { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BuilderQuery, FormulaQuery, ReduceTo};

    fn key(host: &str) -> SeriesKey {
        SeriesKey::from_pairs([("host_name", host)])
    }

    fn series(host: &str, points: &[(i64, f64)]) -> SeriesResult {
        SeriesResult::new(key(host), points.iter().copied().map(Sample::from).collect())
    }

    fn composite(panel: PanelType) -> CompositeQuery {
        CompositeQuery::builder()
            .builder_query(BuilderQuery::new("A", "cpu").with_legend("cpu"))
            .builder_query(
                BuilderQuery::new("B", "mem")
                    .with_legend("mem")
                    .with_reduce_to(ReduceTo::Last),
            )
            .panel_type(panel)
            .unit("percent")
            .build()
            .unwrap()
    }

    fn results() -> BTreeMap<String, Vec<SeriesResult>> {
        let mut results = BTreeMap::new();
        results.insert(
            "A".to_string(),
            vec![series("b", &[(1, 2.0), (2, 4.0), (3, 6.0)]), series("a", &[(1, 1.0)])],
        );
        results.insert("B".to_string(), vec![series("a", &[(1, 2.0), (2, 4.0), (3, 6.0)])]);
        results
    }

    #[test]
    fn test_table_rows_and_no_data() {
        let composite = composite(PanelType::Table);
        let plan = composite.plan().unwrap();
        let response =
            ResultFormatter::new(&composite, &plan).format(&results(), true, SchemaVersion::V4);

        let columns = response.columns().unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["host_name", "A", "B"]);
        assert!(!columns[0].is_value_column);
        assert_eq!(columns[1].legend.as_deref(), Some("cpu"));

        let rows = response.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].groups["host_name"], "a");
        assert_eq!(rows[0].values["A"], ReducedValue::Value(1.0));
        assert_eq!(rows[0].values["B"], ReducedValue::Value(6.0));
        assert_eq!(rows[1].groups["host_name"], "b");
        assert_eq!(rows[1].values["A"], ReducedValue::Value(4.0));
        assert_eq!(rows[1].values["B"], ReducedValue::NoData);
        assert_eq!(response.unit.as_deref(), Some("percent"));
    }

    #[test]
    fn test_empty_samples_are_no_data_not_zero() {
        let composite = composite(PanelType::Table);
        let plan = composite.plan().unwrap();
        let mut results = results();
        results.insert("B".to_string(), vec![series("a", &[])]);

        let response =

            ResultFormatter::new(&composite, &plan).format(&results, true, SchemaVersion::V4);
        assert!(response.rows().unwrap()[0].values["B"].is_no_data());
    }

    #[test]
    fn test_series_mode_skips_disabled() {
        let composite = CompositeQuery::builder()
            .builder_query(BuilderQuery::new("A", "cpu").disabled(true))
            .builder_query(BuilderQuery::new("B", "cpu").disabled(true))
            .formula(FormulaQuery::new("F1", "A/B").with_legend("ratio"))
            .build()
            .unwrap();
        let plan = composite.plan().unwrap();
        let mut results = results();
        results.insert("F1".to_string(), vec![series("a", &[(1, 0.5)])]);

        let response =

            ResultFormatter::new(&composite, &plan).format(&results, true, SchemaVersion::V3);
        let series = response.series().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].query_name, "F1");
        assert_eq!(series[0].legend, "ratio");
        assert_eq!(series[0].series[0].labels[0].value, "a");
    }

    #[test]
    fn test_table_without_web_format_reduces_series() {
        let composite = composite(PanelType::Table);
        let plan = composite.plan().unwrap();
        let response =
            ResultFormatter::new(&composite, &plan).format(&results(), false, SchemaVersion::V4);

        let series = response.series().unwrap();
        assert_eq!(series[0].series[0].values, vec![Sample::new(3, 4.0)]);
    }

    #[test]
    fn test_series_values_encode_non_finite_as_strings() {
        let composite = composite(PanelType::Graph);
        let plan = composite.plan().unwrap();
        let mut results = results();
        results.insert("B".to_string(), vec![series("a", &[(1, f64::INFINITY), (2, f64::NAN)])]);

        let response =
            ResultFormatter::new(&composite, &plan).format(&results, false, SchemaVersion::V3);
        let value: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        let values = &value["series"][1]["series"][0]["values"];
        assert_eq!(values[0]["value"], "+Inf");
        assert_eq!(values[1]["value"], "NaN");

        let back: QueryResponse = serde_json::from_value(value).unwrap();
        let samples = &back.series().unwrap()[1].series[0].values;
        assert_eq!(samples[0], Sample::new(1, f64::INFINITY));
        assert!(samples[1].value.is_nan());
    }

    #[test]
    fn test_json_shape() {
        let composite = composite(PanelType::Table);
        let plan = composite.plan().unwrap();
        let response =
            ResultFormatter::new(&composite, &plan).format(&results(), true, SchemaVersion::V4);

        let value: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(value["resultType"], "table");
        assert_eq!(value["version"], "v4");
        assert_eq!(value["rows"][1]["values"]["B"], "n/a");

        let back: QueryResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_reduced_value_non_finite() {
        let json = serde_json::to_string(&ReducedValue::Value(f64::INFINITY)).unwrap();
        assert_eq!(json, "\"+Inf\"");
        let back: ReducedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ReducedValue::Value(f64::INFINITY));
        assert!(serde_json::from_str::<ReducedValue>("\"zero\"").is_err());
    }
}

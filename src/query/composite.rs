//! Composite queries
//!
//! A [`CompositeQuery`] is a name-ordered map of [`QueryEntry`] values. Each entry
//! is either a [`BuilderQuery`] evaluated by the store or a [`FormulaQuery`]
//! computed from other entries. Entries are built through
//! [`CompositeQueryBuilder`], which runs full validation (names, references,
//! cycles, filters) before a query can exist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::builder::{BuilderQuery, ReduceTo};
use super::planner::QueryPlan;
use crate::error::ValidationError;

/// A formula computed from other entries' results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaQuery {
    /// Unique name within the composite query
    #[serde(rename = "queryName")]
    pub name: String,

    /// Arithmetic expression over other query names (e.g. `A/B*100`)
    pub expression: String,

    /// Display label
    #[serde(default)]
    pub legend: String,

    /// Computed and usable as an operand, but never surfaced on its own
    #[serde(default)]
    pub disabled: bool,

    /// Table-mode reduction; inherited from the first referenced query when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce_to: Option<ReduceTo>,
}

impl FormulaQuery {
    /// Create a formula
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            legend: String::new(),
            disabled: false,
            reduce_to: None,
        }
    }

    /// Set the legend
    pub fn with_legend(mut self, legend: impl Into<String>) -> Self {
        self.legend = legend.into();
        self
    }

    /// Mark as operand-only
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set an explicit table reduction
    pub fn with_reduce_to(mut self, reduce_to: ReduceTo) -> Self {
        self.reduce_to = Some(reduce_to);
        self
    }
}

/// One entry of a composite query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryEntry {
    /// Evaluated by the store
    Builder(BuilderQuery),
    /// Computed from other entries
    Formula(FormulaQuery),
}

impl QueryEntry {
    /// Entry name
    pub fn name(&self) -> &str {
        match self {
            QueryEntry::Builder(q) => &q.name,
            QueryEntry::Formula(f) => &f.name,
        }
    }

    /// Whether the entry is operand-only
    pub fn is_disabled(&self) -> bool {
        match self {
            QueryEntry::Builder(q) => q.disabled,
            QueryEntry::Formula(f) => f.disabled,
        }
    }

    /// Display label
    pub fn legend(&self) -> &str {
        match self {
            QueryEntry::Builder(q) => &q.legend,
            QueryEntry::Formula(f) => &f.legend,
        }
    }

    /// The builder query, if this is one
    pub fn as_builder(&self) -> Option<&BuilderQuery> {
        match self {
            QueryEntry::Builder(q) => Some(q),
            QueryEntry::Formula(_) => None,
        }
    }

    /// The formula, if this is one
    pub fn as_formula(&self) -> Option<&FormulaQuery> {
        match self {
            QueryEntry::Formula(f) => Some(f),
            QueryEntry::Builder(_) => None,
        }
    }
}

impl From<BuilderQuery> for QueryEntry {
    fn from(query: BuilderQuery) -> Self {
        QueryEntry::Builder(query)
    }
}

impl From<FormulaQuery> for QueryEntry {
    fn from(formula: FormulaQuery) -> Self {
        QueryEntry::Formula(formula)
    }
}

/// How the result is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PanelType {
    /// Time series chart
    #[default]
    Graph,
    /// Single value
    Value,
    /// Table
    Table,
}

/// Source language of the composite query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Builder and formula entries
    #[default]
    Builder,
    /// Raw ClickHouse SQL
    ClickhouseSql,
    /// PromQL
    Promql,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Builder => write!(f, "builder"),
            QueryType::ClickhouseSql => write!(f, "clickhouse_sql"),
            QueryType::Promql => write!(f, "promql"),
        }
    }
}

/// A set of named builder and formula queries evaluated together
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeQuery {
    /// Entries by name
    pub queries: BTreeMap<String, QueryEntry>,

    /// Display kind
    #[serde(default)]
    pub panel_type: PanelType,

    /// Source language
    #[serde(default)]
    pub query_type: QueryType,

    /// Display unit copied to the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl CompositeQuery {
    /// Start building a composite query
    pub fn builder() -> CompositeQueryBuilder {
        CompositeQueryBuilder::default()
    }

    /// Look up an entry
    pub fn get(&self, name: &str) -> Option<&QueryEntry> {
        self.queries.get(name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Validate and produce an evaluation plan
    ///
    /// Deserialized composite queries are only trusted after this succeeds.
    pub fn plan(&self) -> Result<QueryPlan, ValidationError> {
        QueryPlan::build(self)
    }

    /// Effective table reduction of an entry
    ///
    /// Formulas without an explicit value inherit from the first query they
    /// reference, transitively; `avg` when nothing can be resolved.
    pub fn effective_reduce_to(&self, name: &str) -> ReduceTo {
        let mut current = name;
        // A valid plan is acyclic; the bound stops malformed input from looping
        for _ in 0..=self.queries.len() {
            match self.queries.get(current) {
                Some(QueryEntry::Builder(q)) => return q.reduce_to,
                Some(QueryEntry::Formula(f)) => {
                    if let Some(reduce_to) = f.reduce_to {
                        return reduce_to;
                    }
                    let Ok(expr) = super::expression::parse_expression(&f.name, &f.expression)
                    else {
                        return ReduceTo::default();
                    };
                    match expr.references().first() {
                        Some(first) => {
                            let Some((key, _)) = self.queries.get_key_value(*first) else {
                                return ReduceTo::default();
                            };
                            current = key.as_str();
                        }
                        None => return ReduceTo::default(),
                    }
                }
                None => return ReduceTo::default(),
            }
        }
        ReduceTo::default()
    }
}

/// Builder for [`CompositeQuery`]
#[derive(Debug, Clone, Default)]
pub struct CompositeQueryBuilder {
    entries: Vec<QueryEntry>,
    panel_type: PanelType,
    query_type: QueryType,
    unit: Option<String>,
}

impl CompositeQueryBuilder {
    /// Add a builder query
    pub fn builder_query(mut self, query: BuilderQuery) -> Self {
        self.entries.push(QueryEntry::Builder(query));
        self
    }

    /// Add a formula
    pub fn formula(mut self, formula: FormulaQuery) -> Self {
        self.entries.push(QueryEntry::Formula(formula));
        self
    }

    /// Add any entry
    pub fn entry(mut self, entry: impl Into<QueryEntry>) -> Self {
        self.entries.push(entry.into());
        self
    }

    /// Set the panel type
    pub fn panel_type(mut self, panel_type: PanelType) -> Self {
        self.panel_type = panel_type;
        self
    }

    /// Set the query type
    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    /// Set the display unit
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<CompositeQuery, ValidationError> {
        let mut queries = BTreeMap::new();
        for entry in self.entries {
            let name = entry.name().to_string();
            if queries.contains_key(&name) {
                return Err(ValidationError::DuplicateName(name));
            }
            queries.insert(name, entry);
        }

        let composite = CompositeQuery {
            queries,
            panel_type: self.panel_type,
            query_type: self.query_type,
            unit: self.unit,
        };
        composite.plan()?;
        Ok(composite)
    }
}

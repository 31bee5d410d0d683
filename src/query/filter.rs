//! Attribute filters
//!
//! A [`FilterSet`] restricts which raw series a builder query selects. Each
//! [`FilterItem`] is validated when it is constructed (including when it is
//! deserialized), so evaluating a filter set never fails: operator/type
//! mismatches, list-vs-scalar arity errors and bad regex patterns are all
//! reported as [`ValidationError`]s up front.
//!
//! # Example
//!
//! ```rust
//! use kuba_compose::query::{AttributeKey, FilterItem, FilterSet, Labels};
//!
//! let filters = FilterSet::and(vec![
//!     FilterItem::not_equal(AttributeKey::tag("state"), "idle").unwrap(),
//!     FilterItem::not_contains(AttributeKey::resource("host_name"), "otel-agent").unwrap(),
//! ]);
//!
//! let busy = Labels::new().with_tag("state", "user").with_resource("host_name", "web-1");
//! assert!(filters.matches(&busy));
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::attribute::{AttributeDataType, AttributeKey, AttributeValue, Labels};
use crate::error::ValidationError;

// ============================================================================
// Operators
// ============================================================================

/// Predicate operator of a filter item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equality
    #[serde(rename = "=")]
    Equal,
    /// Inequality
    #[serde(rename = "!=")]
    NotEqual,
    /// Set membership (list literal)
    #[serde(rename = "in")]
    In,
    /// Set non-membership (list literal)
    #[serde(rename = "nin")]
    NotIn,
    /// Substring test (string keys only)
    #[serde(rename = "contains")]
    Contains,
    /// Negated substring test (string keys only)
    #[serde(rename = "ncontains")]
    NotContains,
    /// Numeric greater-than
    #[serde(rename = ">")]
    GreaterThan,
    /// Numeric greater-or-equal
    #[serde(rename = ">=")]
    GreaterThanOrEq,
    /// Numeric less-than
    #[serde(rename = "<")]
    LessThan,
    /// Numeric less-or-equal
    #[serde(rename = "<=")]
    LessThanOrEq,
    /// Regex match (string keys only)
    #[serde(rename = "regex")]
    Regex,
    /// Negated regex match (string keys only)
    #[serde(rename = "nregex")]
    NotRegex,
    /// Attribute is present
    #[serde(rename = "exists")]
    Exists,
    /// Attribute is absent
    #[serde(rename = "nexists")]
    NotExists,
}

impl FilterOperator {
    /// Wire form of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "nin",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "ncontains",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEq => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEq => "<=",
            FilterOperator::Regex => "regex",
            FilterOperator::NotRegex => "nregex",
            FilterOperator::Exists => "exists",
            FilterOperator::NotExists => "nexists",
        }
    }

    /// Negative operators hold when the attribute is missing
    fn holds_when_missing(&self) -> bool {
        matches!(
            self,
            FilterOperator::NotEqual
                | FilterOperator::NotIn
                | FilterOperator::NotContains
                | FilterOperator::NotRegex
                | FilterOperator::NotExists
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal attached to a filter item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// List literal (for `in` / `nin`)
    List(Vec<AttributeValue>),
    /// Scalar literal
    Scalar(AttributeValue),
}

impl From<AttributeValue> for FilterValue {
    fn from(value: AttributeValue) -> Self {
        FilterValue::Scalar(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(value.into())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Scalar(value.into())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Scalar(value.into())
    }
}

// ============================================================================
// Filter Item
// ============================================================================

/// Serialized shape of a filter item, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterItemSpec {
    key: AttributeKey,
    op: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<FilterValue>,
}

/// A single validated predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FilterItemSpec", into = "FilterItemSpec")]
pub struct FilterItem {
    key: AttributeKey,
    operator: FilterOperator,
    value: Option<FilterValue>,
    pattern: Option<Regex>,
}

impl FilterItem {
    /// Build and validate a filter item
    pub fn new(
        key: AttributeKey,
        operator: FilterOperator,
        value: Option<FilterValue>,
    ) -> Result<Self, ValidationError> {
        let pattern = validate(&key, operator, value.as_ref())?;
        Ok(Self {
            key,
            operator,
            value,
            pattern,
        })
    }

    /// `key = value`
    pub fn equal(
        key: AttributeKey,
        value: impl Into<AttributeValue>,
    ) -> Result<Self, ValidationError> {
        Self::new(key, FilterOperator::Equal, Some(FilterValue::Scalar(value.into())))
    }

    /// `key != value`
    pub fn not_equal(
        key: AttributeKey,
        value: impl Into<AttributeValue>,
    ) -> Result<Self, ValidationError> {
        Self::new(key, FilterOperator::NotEqual, Some(FilterValue::Scalar(value.into())))
    }

    /// `key in [values]`
    pub fn in_list<V: Into<AttributeValue>>(
        key: AttributeKey,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, ValidationError> {
        let list = values.into_iter().map(Into::into).collect();
        Self::new(key, FilterOperator::In, Some(FilterValue::List(list)))
    }

    /// `key nin [values]`
    pub fn not_in_list<V: Into<AttributeValue>>(
        key: AttributeKey,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, ValidationError> {
        let list = values.into_iter().map(Into::into).collect();
        Self::new(key, FilterOperator::NotIn, Some(FilterValue::List(list)))
    }

    /// `key contains needle`
    pub fn contains(key: AttributeKey, needle: &str) -> Result<Self, ValidationError> {
        Self::new(key, FilterOperator::Contains, Some(FilterValue::from(needle)))
    }

    /// `key ncontains needle`
    pub fn not_contains(key: AttributeKey, needle: &str) -> Result<Self, ValidationError> {
        Self::new(key, FilterOperator::NotContains, Some(FilterValue::from(needle)))
    }

    /// `key exists`
    pub fn exists(key: AttributeKey) -> Result<Self, ValidationError> {
        Self::new(key, FilterOperator::Exists, None)
    }

    /// Attribute the predicate applies to
    pub fn key(&self) -> &AttributeKey {
        &self.key
    }

    /// Predicate operator
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// Literal, if the operator takes one
    pub fn value(&self) -> Option<&FilterValue> {
        self.value.as_ref()
    }

    /// Evaluate the predicate against a candidate label set
    pub fn matches(&self, labels: &Labels) -> bool {
        let Some(actual) = labels.get(&self.key) else {
            return self.operator.holds_when_missing();
        };

        match (self.operator, self.value.as_ref()) {
            (FilterOperator::Exists, _) => true,
            (FilterOperator::NotExists, _) => false,
            (FilterOperator::Equal, Some(FilterValue::Scalar(expected))) => {
                literal_eq(actual, expected)
            }
            (FilterOperator::NotEqual, Some(FilterValue::Scalar(expected))) => {
                !literal_eq(actual, expected)
            }
            (FilterOperator::In, Some(FilterValue::List(list))) => {
                list.iter().any(|expected| literal_eq(actual, expected))
            }
            (FilterOperator::NotIn, Some(FilterValue::List(list))) => {
                !list.iter().any(|expected| literal_eq(actual, expected))
            }
            (FilterOperator::Contains, Some(FilterValue::Scalar(needle))) => {
                actual.as_string().contains(&needle.as_string())
            }
            (FilterOperator::NotContains, Some(FilterValue::Scalar(needle))) => {
                !actual.as_string().contains(&needle.as_string())
            }
            (FilterOperator::Regex, _) => self
                .pattern
                .as_ref()
                .is_some_and(|re| re.is_match(&actual.as_string())),
            (FilterOperator::NotRegex, _) => self
                .pattern
                .as_ref()
                .is_some_and(|re| !re.is_match(&actual.as_string())),
            (op, Some(FilterValue::Scalar(bound))) => {
                match (actual.as_f64(), bound.as_f64()) {
                    (Some(a), Some(b)) => match op {
                        FilterOperator::GreaterThan => a > b,
                        FilterOperator::GreaterThanOrEq => a >= b,
                        FilterOperator::LessThan => a < b,
                        FilterOperator::LessThanOrEq => a <= b,
                        _ => false,
                    },
                    _ => false,
                }
            }
            // Unreachable for validated items
            _ => false,
        }
    }
}

impl TryFrom<FilterItemSpec> for FilterItem {
    type Error = ValidationError;

    fn try_from(spec: FilterItemSpec) -> Result<Self, Self::Error> {
        FilterItem::new(spec.key, spec.op, spec.value)
    }
}

impl From<FilterItem> for FilterItemSpec {
    fn from(item: FilterItem) -> Self {
        FilterItemSpec {
            key: item.key,
            op: item.operator,
            value: item.value,
        }
    }
}

/// Compare a label against a literal using the literal's type
fn literal_eq(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    match expected {
        AttributeValue::Number(n) => actual.as_f64() == Some(*n),
        AttributeValue::Bool(b) => actual.as_bool() == Some(*b),
        AttributeValue::String(s) => actual.as_string() == *s,
    }
}

/// Check a literal against the key's declared type
fn literal_fits(data_type: AttributeDataType, literal: &AttributeValue) -> bool {
    match data_type {
        AttributeDataType::String => literal.is_string(),
        AttributeDataType::Int64 => {
            matches!(literal, AttributeValue::Number(n) if n.fract() == 0.0)
        }
        AttributeDataType::Float64 => matches!(literal, AttributeValue::Number(_)),
        AttributeDataType::Bool => matches!(literal, AttributeValue::Bool(_)),
        AttributeDataType::Unspecified => true,
    }
}

/// Validate operator/type/arity and compile regex patterns
fn validate(
    key: &AttributeKey,
    operator: FilterOperator,
    value: Option<&FilterValue>,
) -> Result<Option<Regex>, ValidationError> {
    let invalid = |message: String| ValidationError::InvalidFilterValue {
        key: key.name.clone(),
        operator: operator.to_string(),
        message,
    };
    let incompatible = || ValidationError::IncompatibleOperator {
        key: key.name.clone(),
        operator: operator.to_string(),
        data_type: key.data_type.to_string(),
    };
    let check_literal = |literal: &AttributeValue| {
        if literal_fits(key.data_type, literal) {
            Ok(())
        } else {
            Err(invalid(format!(
                "literal {:?} does not match declared type {}",
                literal, key.data_type
            )))
        }
    };

    match operator {
        FilterOperator::Exists | FilterOperator::NotExists => match value {
            None => Ok(None),
            Some(_) => Err(invalid("operator takes no value".to_string())),
        },
        FilterOperator::Equal | FilterOperator::NotEqual => match value {
            Some(FilterValue::Scalar(literal)) => check_literal(literal).map(|_| None),
            Some(FilterValue::List(_)) => Err(invalid("expected a scalar, got a list".to_string())),
            None => Err(invalid("missing value".to_string())),
        },
        FilterOperator::In | FilterOperator::NotIn => match value {
            Some(FilterValue::List(list)) => {
                for literal in list {
                    check_literal(literal)?;
                }
                Ok(None)
            }
            Some(FilterValue::Scalar(_)) => {
                Err(invalid("expected a list, got a scalar".to_string()))
            }
            None => Err(invalid("missing value".to_string())),
        },
        FilterOperator::Contains
        | FilterOperator::NotContains
        | FilterOperator::Regex
        | FilterOperator::NotRegex => {
            if key.data_type != AttributeDataType::String {
                return Err(incompatible());
            }
            let needle = match value {
                Some(FilterValue::Scalar(AttributeValue::String(s))) => s,
                Some(_) => return Err(invalid("expected a string scalar".to_string())),
                None => return Err(invalid("missing value".to_string())),
            };
            if matches!(operator, FilterOperator::Regex | FilterOperator::NotRegex) {
                Regex::new(needle)
                    .map(Some)
                    .map_err(|e| invalid(format!("bad pattern: {}", e)))
            } else {
                Ok(None)
            }
        }
        FilterOperator::GreaterThan
        | FilterOperator::GreaterThanOrEq
        | FilterOperator::LessThan
        | FilterOperator::LessThanOrEq => {
            if !key.data_type.is_numeric() {
                return Err(incompatible());
            }
            match value {
                Some(FilterValue::Scalar(literal @ AttributeValue::Number(_))) => {
                    check_literal(literal).map(|_| None)
                }
                Some(_) => Err(invalid("expected a numeric scalar".to_string())),
                None => Err(invalid("missing value".to_string())),
            }
        }
    }
}

// ============================================================================
// Filter Set
// ============================================================================

/// Boolean combinator of a filter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BoolOperator {
    /// All items must match
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    /// At least one item must match
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Ordered list of predicates joined by AND or OR
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSet {
    /// How items combine
    #[serde(rename = "op", default)]
    pub operator: BoolOperator,

    /// Predicates, evaluated in order
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

impl FilterSet {
    /// Filter set that selects everything
    pub fn empty() -> Self {
        Self::default()
    }

    /// All items must match
    pub fn and(items: Vec<FilterItem>) -> Self {
        Self {
            operator: BoolOperator::And,
            items,
        }
    }

    /// Any item must match
    pub fn or(items: Vec<FilterItem>) -> Self {
        Self {
            operator: BoolOperator::Or,
            items,
        }
    }

    /// Evaluate against a candidate series
    ///
    /// An empty item list never restricts. AND stops at the first failing
    /// item, OR at the first matching one.
    pub fn matches(&self, labels: &Labels) -> bool {
        if self.items.is_empty() {
            return true;
        }
        match self.operator {
            BoolOperator::And => self.items.iter().all(|item| item.matches(labels)),
            BoolOperator::Or => self.items.iter().any(|item| item.matches(labels)),
        }
    }

    /// Whether the set has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

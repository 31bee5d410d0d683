//! Typed attribute keys and label sets
//!
//! An [`AttributeKey`] names a dimension of a measurement. Its identity is the
//! `(name, scope)` pair: a tag-scoped `state` and a resource-scoped `state` are
//! different keys, while the declared data type only constrains which filter
//! operators and literals are allowed on it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeDataType {
    /// Free-form string
    String,
    /// 64-bit integer
    Int64,
    /// 64-bit float
    Float64,
    /// Boolean
    Bool,
    /// Not declared
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl AttributeDataType {
    /// Whether values of this type can be ordered numerically
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeDataType::Int64 | AttributeDataType::Float64)
    }
}

impl fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeDataType::String => write!(f, "string"),
            AttributeDataType::Int64 => write!(f, "int64"),
            AttributeDataType::Float64 => write!(f, "float64"),
            AttributeDataType::Bool => write!(f, "bool"),
            AttributeDataType::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Where an attribute lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeScope {
    /// Intrinsic property of a single measurement point (e.g. `state`)
    Tag,
    /// Property of the entity producing the measurement (e.g. `host_name`)
    Resource,
    /// Not declared; lookups try tag scope, then resource scope
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

/// A typed, scoped attribute name
///
/// Equality and hashing only consider `(name, scope)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKey {
    /// Attribute name
    #[serde(rename = "key")]
    pub name: String,

    /// Declared value type
    #[serde(default)]
    pub data_type: AttributeDataType,

    /// Tag or resource scope
    #[serde(rename = "type", default)]
    pub scope: AttributeScope,
}

impl AttributeKey {
    /// Create a key with explicit type and scope
    pub fn new(
        name: impl Into<String>,
        data_type: AttributeDataType,
        scope: AttributeScope,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            scope,
        }
    }

    /// String-typed tag attribute
    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(name, AttributeDataType::String, AttributeScope::Tag)
    }

    /// String-typed resource attribute
    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(name, AttributeDataType::String, AttributeScope::Resource)
    }

    /// Metric name key (float64, no scope)
    pub fn metric(name: impl Into<String>) -> Self {
        Self::new(name, AttributeDataType::Float64, AttributeScope::Unspecified)
    }

    /// Override the declared data type
    pub fn with_data_type(mut self, data_type: AttributeDataType) -> Self {
        self.data_type = data_type;
        self
    }
}

impl PartialEq for AttributeKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.scope == other.scope
    }
}

impl Eq for AttributeKey {}

impl Hash for AttributeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.scope.hash(state);
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            AttributeScope::Tag => write!(f, "tag:{}", self.name),
            AttributeScope::Resource => write!(f, "resource:{}", self.name),
            AttributeScope::Unspecified => write!(f, "{}", self.name),
        }
    }
}

/// A label or filter literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean literal
    Bool(bool),
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
}

impl AttributeValue {
    /// Numeric view; strings are parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Bool(_) => None,
        }
    }

    /// Boolean view; `"true"`/`"false"` strings are parsed
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Number(_) => None,
        }
    }

    /// String view of any literal
    pub fn as_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Number(n) => n.to_string(),
            AttributeValue::Bool(b) => b.to_string(),
        }
    }

    /// Whether this literal is a string
    pub fn is_string(&self) -> bool {
        matches!(self, AttributeValue::String(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Attribute values attached to one candidate series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
    values: HashMap<AttributeKey, AttributeValue>,
}

impl Labels {
    /// Empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag-scoped string label
    pub fn with_tag(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.insert(AttributeKey::tag(name), value);
        self
    }

    /// Add a resource-scoped string label
    pub fn with_resource(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.insert(AttributeKey::resource(name), value);
        self
    }

    /// Insert a label
    pub fn insert(&mut self, key: AttributeKey, value: impl Into<AttributeValue>) {
        self.values.insert(key, value.into());
    }

    /// Look up a label by identity
    ///
    /// Keys with unspecified scope fall back to tag, then resource scope.
    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        if let Some(value) = self.values.get(key) {
            return Some(value);
        }
        if key.scope == AttributeScope::Unspecified {
            for scope in [AttributeScope::Tag, AttributeScope::Resource] {
                let scoped = AttributeKey::new(key.name.clone(), key.data_type, scope);
                if let Some(value) = self.values.get(&scoped) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

//! Field descriptors: what to read from a source object and how to coerce it.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::error::PipelineError;
use crate::resource::{Lookup, Resource};

/// The closed set of field behaviours.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Passes the raw value through unchanged. Missing keys read as `null`.
    Plain,
    /// Text coercion. The key must be present; `null` stays `null`.
    String,
    /// Integer coercion; numeric strings are parsed.
    Integer,
    /// Boolean coercion; accepts `true/false`, `1/0`, `yes/no`, `on/off`.
    Boolean,
    /// A link whose raw value is the target URL.
    Uri { relation: Option<String> },
    /// A link synthesized from another endpoint plus query parameters.
    RelatedUri {
        relation: Option<String>,
        endpoint: String,
        params: Vec<(String, LinkParam)>,
    },
    /// Mirrors the serialized value of a sibling field.
    Reference { target: String },
}

/// Value of a query parameter on a [`FieldKind::RelatedUri`] link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkParam {
    Literal(String),
    /// The serialized value of a sibling field.
    Field(String),
}

/// Declarative description of one serialized field.
///
/// ```
/// use restform_core::Field;
///
/// let id = Field::integer("id").primary_key();
/// let title = Field::string("title").source("headline").prompt("Title");
/// let author = Field::related_uri("author", "/authors").field_param("article", "id");
///
/// assert_eq!(title.source_key(), "headline");
/// assert!(id.is_primary_key());
/// assert!(author.is_link());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    source: Option<String>,
    primary_key: bool,
    display_prompt: Option<String>,
    /// Link options set on a kind they do not apply to.
    misapplied: Vec<&'static str>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            source: None,
            primary_key: false,
            display_prompt: None,
            misapplied: Vec::new(),
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Plain)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn uri(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uri { relation: None })
    }

    /// A link to `endpoint` (a path relative to the URL root).
    pub fn related_uri(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::RelatedUri {
                relation: None,
                endpoint: endpoint.into(),
                params: Vec::new(),
            },
        )
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                target: target.into(),
            },
        )
    }

    /// Read from `key` instead of the field name.
    pub fn source(mut self, key: impl Into<String>) -> Self {
        self.source = Some(key.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.display_prompt = Some(prompt.into());
        self
    }

    /// Set the link relation.
    ///
    /// Only link fields have a relation; on any other kind the schema or
    /// filter set holding this field refuses to build.
    pub fn relation(mut self, rel: impl Into<String>) -> Self {
        match &mut self.kind {
            FieldKind::Uri { relation } | FieldKind::RelatedUri { relation, .. } => {
                *relation = Some(rel.into());
            }
            _ => self.misapplied.push("relation"),
        }
        self
    }

    /// Add a literal query parameter to a related link.
    pub fn param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_param("param", name.into(), LinkParam::Literal(value.into()))
    }

    /// Add a query parameter mirroring a sibling field.
    pub fn field_param(self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.push_param("field_param", name.into(), LinkParam::Field(field.into()))
    }

    fn push_param(mut self, option: &'static str, name: String, value: LinkParam) -> Self {
        match &mut self.kind {
            FieldKind::RelatedUri { params, .. } => params.push((name, value)),
            _ => self.misapplied.push(option),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The key or attribute this field reads.
    pub fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn display_prompt(&self) -> Option<&str> {
        self.display_prompt.as_deref()
    }

    /// Whether this field renders as a hypermedia link.
    pub fn is_link(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Uri { .. } | FieldKind::RelatedUri { .. }
        )
    }

    /// Link relation, defaulting to the field name. `None` for non-link fields.
    pub fn relation_name(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Uri { relation } | FieldKind::RelatedUri { relation, .. } => {
                Some(relation.as_deref().unwrap_or(&self.name))
            }
            _ => None,
        }
    }

    /// The first link option set on a kind it does not apply to.
    pub(crate) fn misapplied_option(&self) -> Option<&'static str> {
        self.misapplied.first().copied()
    }

    /// Names of sibling fields this field depends on.
    pub(crate) fn dependencies(&self) -> Vec<&str> {
        match &self.kind {
            FieldKind::Reference { target } => vec![target.as_str()],
            FieldKind::RelatedUri { params, .. } => params
                .iter()
                .filter_map(|(_, param)| match param {
                    LinkParam::Field(target) => Some(target.as_str()),
                    LinkParam::Literal(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Read this field's raw value from `item`.
    pub(crate) fn read(&self, item: &Resource) -> Result<RawValue, PipelineError> {
        // Derived fields have no value of their own.
        if matches!(
            self.kind,
            FieldKind::Reference { .. } | FieldKind::RelatedUri { .. }
        ) {
            return Ok(RawValue::Missing);
        }
        match item.lookup(self.source_key()) {
            Lookup::Found(Some(value)) => Ok(RawValue::Present(value)),
            Lookup::Found(None) if self.kind == FieldKind::String => {
                Err(PipelineError::MissingField {
                    field: self.name.clone(),
                    key: self.source_key().to_string(),
                })
            }
            Lookup::Found(None) => Ok(RawValue::Missing),
            Lookup::Failed(err) => Err(PipelineError::unserializable(item.shape(), err.to_string())),
            Lookup::Unreadable => Err(PipelineError::unserializable(
                item.shape(),
                "only mappings and records can be projected onto fields",
            )),
        }
    }

    /// Type coercion shared by serialization and deserialization.
    ///
    /// Derived kinds (references and related links) pass values through.
    pub fn coerce(&self, value: &Value) -> Result<Value, CoercionError> {
        match self.kind {
            FieldKind::String | FieldKind::Uri { .. } => Ok(coerce_text(value)),
            FieldKind::Integer => coerce_integer(value),
            FieldKind::Boolean => coerce_boolean(value),
            FieldKind::Plain | FieldKind::RelatedUri { .. } | FieldKind::Reference { .. } => {
                Ok(value.clone())
            }
        }
    }

    /// Coerce an inbound value (query parameter or payload entry).
    pub fn deserialize_value(&self, value: &Value) -> Result<Value, CoercionError> {
        self.coerce(value)
    }
}

/// Raw value of a bound field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Present(Value),
    /// The source had no such key, or the field has no value of its own.
    Missing,
}

impl RawValue {
    /// The value to serialize; missing values read as `null`.
    pub fn as_value(&self) -> &Value {
        static NULL: Value = Value::Null;
        match self {
            RawValue::Present(value) => value,
            RawValue::Missing => &NULL,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }
}

/// A value that cannot be coerced to a field's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found `{found}`")]
pub struct CoercionError {
    pub expected: &'static str,
    pub found: String,
}

impl CoercionError {
    fn new(expected: &'static str, found: &Value) -> Self {
        Self {
            expected,
            found: text_of(found),
        }
    }
}

/// Plain text rendering of a JSON value, strings unquoted.
pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_text(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(_) => value.clone(),
        other => Value::String(text_of(other)),
    }
}

fn coerce_integer(value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Value::Number(Number::from(f as i64)))
            }
            _ => Err(CoercionError::new("an integer", value)),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(Number::from(n)))
            .map_err(|_| CoercionError::new("an integer", value)),
        _ => Err(CoercionError::new("an integer", value)),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Null | Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(CoercionError::new("a boolean", value)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(CoercionError::new("a boolean", value)),
        },
        _ => Err(CoercionError::new("a boolean", value)),
    }
}

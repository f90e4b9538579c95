//! Handler output: mappings, structured records and sequences of them.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// A structured record whose attributes can be read by name.
///
/// Usually derived:
///
/// ```ignore
/// use restform::Record;
///
/// #[derive(serde::Serialize, Record)]
/// struct Article {
///     id: u64,
///     title: String,
/// }
/// ```
pub trait Record: Send + Sync {
    /// Read an attribute.
    ///
    /// `Ok(None)` means the record has no attribute by that name. An
    /// attribute that exists but cannot be turned into JSON is an error, so
    /// it is reported instead of rendering as missing.
    fn attribute(&self, name: &str) -> Result<Option<Value>, AttributeError>;

    /// Name used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An attribute that exists but could not be converted to JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute `{attribute}` could not be read: {reason}")]
pub struct AttributeError {
    attribute: String,
    reason: String,
}

impl AttributeError {
    pub fn new(attribute: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            attribute: attribute.into(),
            reason: reason.to_string(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

/// The object a handler returns.
pub enum Resource {
    Mapping(Map<String, Value>),
    Record(Box<dyn Record>),
    Sequence(Vec<Resource>),
    /// Anything else; scalars cannot be projected through a serializer.
    Value(Value),
}

impl Resource {
    pub fn record(record: impl Record + 'static) -> Self {
        Resource::Record(Box::new(record))
    }

    pub fn records<I, R>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Record + 'static,
    {
        Resource::Sequence(records.into_iter().map(Resource::record).collect())
    }

    /// An empty sequence, rendered as an empty collection.
    pub fn empty() -> Self {
        Resource::Sequence(Vec::new())
    }

    /// Normalize into the list of items to render: a sequence is passed
    /// through, anything else becomes a one-element list.
    pub fn into_items(self) -> Vec<Resource> {
        match self {
            Resource::Sequence(items) => items,
            Resource::Value(Value::Array(values)) => values.into_iter().map(Resource::from).collect(),
            other => vec![other],
        }
    }

    /// Short description of the shape, used in error messages.
    pub fn shape(&self) -> String {
        match self {
            Resource::Mapping(_) => "a mapping".to_string(),
            Resource::Record(record) => format!("record `{}`", record.type_name()),
            Resource::Sequence(_) => "a nested sequence".to_string(),
            Resource::Value(Value::Null) => "null".to_string(),
            Resource::Value(Value::Bool(_)) => "a boolean".to_string(),
            Resource::Value(Value::Number(_)) => "a number".to_string(),
            Resource::Value(Value::String(_)) => "a string".to_string(),
            Resource::Value(Value::Array(_)) => "a nested sequence".to_string(),
            Resource::Value(Value::Object(_)) => "a mapping".to_string(),
        }
    }

    /// Look up `key` as a mapping key or record attribute.
    ///
    /// `None` means the item can be read but has no such key; shapes that
    /// cannot be read by key at all are reported as [`Lookup::Unreadable`].
    pub(crate) fn lookup(&self, key: &str) -> Lookup {
        match self {
            Resource::Mapping(map) | Resource::Value(Value::Object(map)) => {
                Lookup::Found(map.get(key).cloned())
            }
            Resource::Record(record) => match record.attribute(key) {
                Ok(value) => Lookup::Found(value),
                Err(err) => Lookup::Failed(err),
            },
            _ => Lookup::Unreadable,
        }
    }

    /// The mapping view, if this item is a mapping.
    pub(crate) fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            Resource::Mapping(map) | Resource::Value(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

pub(crate) enum Lookup {
    Found(Option<Value>),
    /// The attribute exists but could not be read.
    Failed(AttributeError),
    Unreadable,
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Resource::Mapping(map),
            Value::Array(values) => {
                Resource::Sequence(values.into_iter().map(Resource::from).collect())
            }
            other => Resource::Value(other),
        }
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(map: Map<String, Value>) -> Self {
        Resource::Mapping(map)
    }
}

impl From<Vec<Resource>> for Resource {
    fn from(items: Vec<Resource>) -> Self {
        Resource::Sequence(items)
    }
}

impl From<Vec<Value>> for Resource {
    fn from(values: Vec<Value>) -> Self {
        Resource::Sequence(values.into_iter().map(Resource::from).collect())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Mapping(map) => f.debug_tuple("Mapping").field(map).finish(),
            Resource::Record(record) => f.debug_tuple("Record").field(&record.type_name()).finish(),
            Resource::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
            Resource::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Point {
        x: i64,
    }

    impl Record for Point {
        fn attribute(&self, name: &str) -> Result<Option<Value>, AttributeError> {
            match name {
                "x" => Ok(Some(json!(self.x))),
                "broken" => Err(AttributeError::new("broken", "key must be a string")),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn test_single_value_wrapped() {
        let items = Resource::from(json!({"hello": "world"})).into_items();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Resource::Mapping(_)));
    }

    #[test]
    fn test_sequence_passed_through() {
        let items = Resource::from(json!([{"a": 1}, {"a": 2}])).into_items();
        assert_eq!(items.len(), 2);
        assert!(Resource::empty().into_items().is_empty());
    }

    #[test]
    fn test_lookup_mapping_and_record() {
        let mapping = Resource::from(json!({"x": 1}));
        assert!(matches!(mapping.lookup("x"), Lookup::Found(Some(v)) if v == json!(1)));
        assert!(matches!(mapping.lookup("y"), Lookup::Found(None)));

        let record = Resource::record(Point { x: 3 });
        assert!(matches!(record.lookup("x"), Lookup::Found(Some(v)) if v == json!(3)));
        assert!(matches!(record.lookup("y"), Lookup::Found(None)));
        assert!(matches!(record.lookup("broken"), Lookup::Failed(err) if err.attribute() == "broken"));

        let scalar = Resource::from(json!("text"));
        assert!(matches!(scalar.lookup("x"), Lookup::Unreadable));
        assert_eq!(scalar.shape(), "a string");
    }

    #[test]
    fn test_record_shape_names_type() {
        let record = Resource::record(Point { x: 0 });
        assert!(record.shape().contains("Point"));
    }
}

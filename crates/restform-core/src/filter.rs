//! Query-parameter filters.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{PipelineError, SchemaError};
use crate::field::{Field, FieldKind};

/// A field that reads from the query string instead of the handler's result.
///
/// The query key is the field's source key.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: Field,
}

impl Filter {
    pub fn new(field: Field) -> Self {
        Self { field }
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Coerce this filter's query parameter. An absent parameter is `null`.
    pub fn validate_input(&self, query: &IndexMap<String, String>) -> Result<Value, PipelineError> {
        let Some(raw) = query.get(self.field.source_key()) else {
            return Ok(Value::Null);
        };
        self.field
            .deserialize_value(&Value::String(raw.clone()))
            .map_err(|err| PipelineError::FilterValidation {
                filter: self.name().to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            })
    }
}

/// A named group of filters validated together.
///
/// ```
/// use restform_core::{Field, FilterSet, RequestContext};
///
/// let filters = FilterSet::builder("ArticleFilters")
///     .filter(Field::integer("author"))
///     .filter(Field::boolean("published"))
///     .build()
///     .unwrap();
///
/// let ctx = RequestContext::new("http://localhost/articles?author=7", "http://localhost/");
/// let validated = filters.validate_inputs(&ctx).unwrap();
/// assert_eq!(validated.get("author"), Some(&serde_json::json!(7)));
/// assert!(!validated.is_set("published"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    name: String,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
pub struct FilterSetBuilder {
    name: String,
    filters: Vec<Filter>,
}

impl FilterSetBuilder {
    pub fn filter(mut self, field: Field) -> Self {
        self.filters.push(Filter::new(field));
        self
    }

    pub fn build(self) -> Result<FilterSet, SchemaError> {
        let mut seen = HashSet::new();
        for filter in &self.filters {
            if !seen.insert(filter.name()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: filter.name().to_string(),
                });
            }
            // Filters are independent of each other and of any result object.
            if matches!(
                filter.field().kind(),
                FieldKind::Reference { .. } | FieldKind::RelatedUri { .. }
            ) {
                return Err(SchemaError::UnsupportedFilter {
                    schema: self.name.clone(),
                    field: filter.name().to_string(),
                });
            }
            if let Some(option) = filter.field().misapplied_option() {
                return Err(SchemaError::InapplicableOption {
                    schema: self.name.clone(),
                    field: filter.name().to_string(),
                    option,
                });
            }
        }
        Ok(FilterSet {
            name: self.name,
            filters: self.filters,
        })
    }
}

impl FilterSet {
    pub fn builder(name: impl Into<String>) -> FilterSetBuilder {
        FilterSetBuilder {
            name: name.into(),
            filters: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Validate every filter against the request's query string, stopping at
    /// the first failure.
    pub fn validate_inputs(&self, request: &RequestContext) -> Result<ValidatedFilters, PipelineError> {
        let mut values = IndexMap::with_capacity(self.filters.len());
        for filter in &self.filters {
            let value = filter.validate_input(request.query_params())?;
            tracing::debug!(filter = filter.name(), %value, "validated filter");
            values.insert(filter.name().to_string(), value);
        }
        Ok(ValidatedFilters { values })
    }
}

/// Per-request filter values, keyed by filter name. Absent parameters are `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedFilters {
    values: IndexMap<String, Value>,
}

impl ValidatedFilters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether the filter was supplied with a non-null value.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|value| !value.is_null())
    }

    /// Deserialize a filter value into `T`. `None` when the filter is unset.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<Result<T, serde_json::Error>> {
        self.values
            .get(name)
            .filter(|value| !value.is_null())
            .map(|value| T::deserialize(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters() -> FilterSet {
        FilterSet::builder("ArticleFilters")
            .filter(Field::integer("author"))
            .filter(Field::string("tag").source("t"))
            .filter(Field::boolean("draft"))
            .build()
            .unwrap()
    }

    fn ctx(query: &str) -> RequestContext {
        RequestContext::new(format!("http://localhost/articles?{query}"), "http://localhost/")
    }

    #[test]
    fn test_absent_parameter_is_null() {
        let validated = filters().validate_inputs(&ctx("")).unwrap();
        assert_eq!(validated.len(), 3);
        assert_eq!(validated.get("author"), Some(&Value::Null));
        assert!(!validated.is_set("author"));
    }

    #[test]
    fn test_coercion_and_source_key() {
        let validated = filters()
            .validate_inputs(&ctx("author=12&t=rust&draft=yes"))
            .unwrap();
        assert_eq!(validated.get("author"), Some(&json!(12)));
        assert_eq!(validated.get("tag"), Some(&json!("rust")));
        assert_eq!(validated.get("draft"), Some(&json!(true)));
        assert_eq!(validated.get_as::<i64>("author").unwrap().unwrap(), 12);
    }

    #[test]
    fn test_first_failure_aborts() {
        let err = filters()
            .validate_inputs(&ctx("author=abc&draft=maybe"))
            .unwrap_err();
        match err {
            PipelineError::FilterValidation { filter, value, .. } => {
                assert_eq!(filter, "author");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_builder_rejects_derived_fields() {
        let err = FilterSet::builder("Bad")
            .filter(Field::reference("a", "b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFilter { .. }));

        let err = FilterSet::builder("Dup")
            .filter(Field::plain("a"))
            .filter(Field::plain("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_builder_rejects_link_options_on_plain_filters() {
        let err = FilterSet::builder("Bad")
            .filter(Field::integer("author").relation("author"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::InapplicableOption {
                schema: "Bad".to_string(),
                field: "author".to_string(),
                option: "relation",
            }
        );
    }
}

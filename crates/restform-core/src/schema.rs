//! Serializer and deserializer schemas, and per-item field binding.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::{PipelineError, SchemaError};
use crate::field::{Field, FieldKind, LinkParam, RawValue, text_of};
use crate::resource::Resource;

/// An ordered, named set of field declarations.
///
/// Built once and shared (usually behind an `Arc`) by every request; binding
/// to an item produces a [`BoundSerializer`] and never touches the schema.
///
/// ```
/// use restform_core::{Field, Schema};
///
/// let schema = Schema::builder("ArticleSerializer")
///     .field(Field::integer("id").primary_key())
///     .field(Field::string("title"))
///     .field(Field::uri("website").relation("alternate"))
///     .build()
///     .unwrap();
///
/// assert_eq!(schema.len(), 3);
/// assert_eq!(schema.primary_key().map(|f| f.name()), Some("id"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Append a field; declaration order is rendering order.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Validate names and references and build the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name().to_string(),
                });
            }
        }
        for field in &self.fields {
            if let Some(option) = field.misapplied_option() {
                return Err(SchemaError::InapplicableOption {
                    schema: self.name.clone(),
                    field: field.name().to_string(),
                    option,
                });
            }
            for target in field.dependencies() {
                if !seen.contains(target) {
                    return Err(SchemaError::UnknownReference {
                        schema: self.name.clone(),
                        field: field.name().to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }
        let schema = Schema {
            name: self.name,
            fields: self.fields,
        };
        schema.check_cycles()?;
        Ok(schema)
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// A schema of plain fields mirroring a mapping's keys, used when an
    /// endpoint has no serializer of its own.
    pub fn inferred(item: &Resource) -> Result<Schema, PipelineError> {
        let map = item.as_mapping().ok_or_else(|| {
            PipelineError::unserializable(
                item.shape(),
                "no serializer is registered and only mappings can be passed through",
            )
        })?;
        Ok(Schema {
            name: "inferred".to_string(),
            fields: map.keys().map(Field::plain).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// The first field marked as primary key.
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_primary_key())
    }

    /// Bind every field to `item`, in declaration order.
    pub fn bind<'s>(&'s self, item: &Resource) -> Result<BoundSerializer<'s>, PipelineError> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                Ok(BoundField {
                    field,
                    raw: field.read(item)?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Ok(BoundSerializer {
            schema: self,
            fields,
        })
    }

    /// Reject fields whose value depends on itself, through references or
    /// related-link parameters.
    fn check_cycles(&self) -> Result<(), SchemaError> {
        let mut marks = vec![Mark::Unvisited; self.fields.len()];
        for index in 0..self.fields.len() {
            self.visit(index, &mut marks)?;
        }
        Ok(())
    }

    fn visit(&self, index: usize, marks: &mut [Mark]) -> Result<(), SchemaError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(SchemaError::CyclicReference {
                    schema: self.name.clone(),
                    field: self.fields[index].name().to_string(),
                });
            }
            Mark::Unvisited => {}
        }
        marks[index] = Mark::InProgress;
        for target in self.fields[index].dependencies() {
            if let Some(next) = self.fields.iter().position(|f| f.name() == target) {
                self.visit(next, marks)?;
            }
        }
        marks[index] = Mark::Done;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// One field bound to one source item.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundField<'s> {
    field: &'s Field,
    raw: RawValue,
}

impl<'s> BoundField<'s> {
    pub fn field(&self) -> &'s Field {
        self.field
    }

    pub fn name(&self) -> &'s str {
        self.field.name()
    }

    pub fn raw_value(&self) -> &RawValue {
        &self.raw
    }
}

/// A schema bound to one item: the resolved raw value of every field.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSerializer<'s> {
    schema: &'s Schema,
    fields: Vec<BoundField<'s>>,
}

impl<'s> BoundSerializer<'s> {
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Bound fields in declaration order.
    pub fn fields(&self) -> &[BoundField<'s>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&BoundField<'s>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn primary_key(&self) -> Option<&BoundField<'s>> {
        self.fields.iter().find(|f| f.field.is_primary_key())
    }

    /// Serialized value of `bound`.
    ///
    /// Takes `&self`: serializing never mutates the bound raw values, so
    /// rendering the same binding twice gives the same output.
    pub fn serialize_value(
        &self,
        bound: &BoundField<'s>,
        request: &RequestContext,
    ) -> Result<Value, PipelineError> {
        let field = bound.field;
        match field.kind() {
            FieldKind::Reference { target } => {
                let sibling = self.sibling(field, target)?;
                self.serialize_value(sibling, request)
            }
            FieldKind::RelatedUri {
                endpoint, params, ..
            } => {
                let mut url = format!(
                    "{}{}",
                    request.url_root(),
                    endpoint.trim_start_matches('/')
                );
                if !params.is_empty() {
                    let mut query = form_urlencoded::Serializer::new(String::new());
                    for (name, param) in params {
                        let value = match param {
                            LinkParam::Literal(value) => value.clone(),
                            LinkParam::Field(target) => {
                                let sibling = self.sibling(field, target)?;
                                match self.serialize_value(sibling, request)? {
                                    Value::Null => String::new(),
                                    other => text_of(&other),
                                }
                            }
                        };
                        query.append_pair(name, &value);
                    }
                    url.push('?');
                    url.push_str(&query.finish());
                }
                Ok(Value::String(url))
            }
            _ => field.coerce(bound.raw.as_value()).map_err(|err| {
                PipelineError::unserializable(
                    format!("field `{}`", field.name()),
                    err.to_string(),
                )
            }),
        }
    }

    /// Serialize every field into a name-keyed map, in declaration order.
    pub fn to_map(&self, request: &RequestContext) -> Result<Map<String, Value>, PipelineError> {
        let mut map = Map::new();
        for bound in &self.fields {
            map.insert(
                bound.name().to_string(),
                self.serialize_value(bound, request)?,
            );
        }
        Ok(map)
    }

    fn sibling(&self, field: &Field, target: &str) -> Result<&BoundField<'s>, PipelineError> {
        self.field(target)
            .ok_or_else(|| PipelineError::MissingField {
                field: field.name().to_string(),
                key: target.to_string(),
            })
    }
}

/// Reads a JSON request body through a schema's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Deserializer {
    schema: Schema,
}

impl Deserializer {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse and coerce a raw JSON body.
    pub fn deserialize(&self, body: &[u8]) -> Result<Map<String, Value>, PipelineError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| PipelineError::InvalidPayload {
                reason: err.to_string(),
            })?;
        self.deserialize_value(&value)
    }

    /// Coerce an already parsed JSON object, keyed by field name.
    ///
    /// Link and reference fields are output-only and skipped. A missing key is
    /// an error for text fields and `null` for every other kind.
    pub fn deserialize_value(&self, value: &Value) -> Result<Map<String, Value>, PipelineError> {
        let Value::Object(object) = value else {
            return Err(PipelineError::InvalidPayload {
                reason: format!("expected a JSON object, found `{value}`"),
            });
        };
        let mut payload = Map::new();
        for field in self.schema.fields() {
            if matches!(
                field.kind(),
                FieldKind::Reference { .. } | FieldKind::RelatedUri { .. }
            ) {
                continue;
            }
            let coerced = match object.get(field.source_key()) {
                Some(raw) => field.deserialize_value(raw).map_err(|err| {
                    PipelineError::InvalidPayload {
                        reason: format!("field `{}`: {err}", field.name()),
                    }
                })?,
                None if *field.kind() == FieldKind::String => {
                    return Err(PipelineError::InvalidPayload {
                        reason: format!("field `{}` is required", field.name()),
                    });
                }
                None => Value::Null,
            };
            payload.insert(field.name().to_string(), coerced);
        }
        Ok(payload)
    }
}

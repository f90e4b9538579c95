use http::StatusCode;
use serde_json::{Map, Value, json};

use super::{ContentType, Render, Response, json_response};
use crate::error::{Failure, PipelineError, ResultExt};
use crate::field::text_of;
use crate::schema::BoundSerializer;

/// `application/vnd.collection+json`.
///
/// Link fields become `links` entries, everything else `data` entries. Each
/// item's `href` is the endpoint path with its primary key substituted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionJson;

impl CollectionJson {
    pub const MEDIA_TYPE: &'static str = "application/vnd.collection+json";
}

impl ContentType for CollectionJson {
    fn media_type(&self) -> &str {
        Self::MEDIA_TYPE
    }

    fn serialize_item(&self, item: &BoundSerializer<'_>, render: &Render<'_>) -> Result<Value, Failure> {
        let request = render.request();
        let primary_key = item.primary_key().ok_or_else(|| PipelineError::NoPrimaryKey {
            schema: item.schema().name().to_string(),
        })?;

        let mut data = Vec::new();
        let mut links = Vec::new();
        for bound in item.fields() {
            let field = bound.field();
            let value = item
                .serialize_value(bound, request)
                .frame(|| format!("field `{}`", field.name()))?;

            let mut entry = Map::new();
            match field.relation_name() {
                Some(relation) => {
                    entry.insert("href".to_string(), value);
                    entry.insert("rel".to_string(), Value::from(relation));
                }
                None => {
                    entry.insert("name".to_string(), Value::from(field.name()));
                    entry.insert("value".to_string(), value);
                }
            }
            if let Some(prompt) = field.display_prompt() {
                entry.insert("prompt".to_string(), Value::from(prompt));
            }
            if field.is_link() {
                links.push(Value::Object(entry));
            } else {
                data.push(Value::Object(entry));
            }
        }

        let key = item
            .serialize_value(primary_key, request)
            .frame(|| format!("primary key `{}`", primary_key.name()))?;
        let href = format!(
            "{}{}",
            request.url_root(),
            render.endpoint().path().expand(&text_of(&key))
        );

        let mut object = Map::new();
        object.insert("href".to_string(), Value::String(href));
        if !data.is_empty() {
            object.insert("data".to_string(), Value::Array(data));
        }
        if !links.is_empty() {
            object.insert("links".to_string(), Value::Array(links));
        }
        Ok(Value::Object(object))
    }

    /// An empty result omits `items` entirely.
    fn serialize_response(&self, items: Vec<Value>, render: &Render<'_>) -> Value {
        let mut collection = Map::new();
        collection.insert("href".to_string(), Value::from(render.request().url()));
        if !items.is_empty() {
            collection.insert("items".to_string(), Value::Array(items));
        }
        json!({ "collection": collection })
    }

    fn make_error_response(&self, failure: &Failure, status: StatusCode) -> Response {
        let kind = failure.kind().as_str();
        let body = json!({
            "collection": {
                "title": kind,
                "code": kind,
                "message": failure.message(),
                "stacktrace": failure.stacktrace(),
            }
        });
        json_response(status, Self::MEDIA_TYPE, &body)
    }
}

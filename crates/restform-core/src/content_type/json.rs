use http::StatusCode;
use serde_json::{Map, Value, json};

use super::{ContentType, Render, Response, json_response};
use crate::error::{Failure, ResultExt};
use crate::schema::BoundSerializer;

/// `application/json`: `{"items": [{field: value, ...}, ...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    pub const MEDIA_TYPE: &'static str = "application/json";
}

impl ContentType for Json {
    fn media_type(&self) -> &str {
        Self::MEDIA_TYPE
    }

    fn serialize_item(&self, item: &BoundSerializer<'_>, render: &Render<'_>) -> Result<Value, Failure> {
        let mut object = Map::new();
        for bound in item.fields() {
            let value = item
                .serialize_value(bound, render.request())
                .frame(|| format!("field `{}`", bound.name()))?;
            object.insert(bound.name().to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn serialize_response(&self, items: Vec<Value>, _render: &Render<'_>) -> Value {
        json!({ "items": items })
    }

    fn make_error_response(&self, failure: &Failure, status: StatusCode) -> Response {
        let body = json!({
            "error": failure.kind().as_str(),
            "message": failure.message(),
            "stacktrace": failure.stacktrace(),
        });
        json_response(status, Self::MEDIA_TYPE, &body)
    }
}

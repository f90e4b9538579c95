//! Response representations and the map used to negotiate between them.

mod collection;
mod json;

pub use collection::CollectionJson;
pub use json::Json;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use crate::error::{Failure, PipelineError, ResultExt};
use crate::negotiate::AcceptPreferences;
use crate::resource::Resource;
use crate::schema::{BoundSerializer, Schema};

/// Response type produced by the pipeline.
pub type Response = http::Response<Bytes>;

/// What a content type renders against: the endpoint and the current request.
#[derive(Debug, Clone, Copy)]
pub struct Render<'r> {
    endpoint: &'r Endpoint,
    request: &'r RequestContext,
}

impl<'r> Render<'r> {
    pub fn new(endpoint: &'r Endpoint, request: &'r RequestContext) -> Self {
        Self { endpoint, request }
    }

    pub fn endpoint(&self) -> &'r Endpoint {
        self.endpoint
    }

    pub fn request(&self) -> &'r RequestContext {
        self.request
    }
}

/// One wire representation, identified by its media type.
///
/// Implementors provide the item and envelope shapes plus an error envelope;
/// normalizing the handler's result and binding each item is shared.
pub trait ContentType: Send + Sync + fmt::Debug {
    /// The media type sent as `Content-Type` and used as the negotiation key.
    fn media_type(&self) -> &str;

    /// Render one bound item.
    fn serialize_item(&self, item: &BoundSerializer<'_>, render: &Render<'_>) -> Result<Value, Failure>;

    /// Wrap rendered items in the response envelope.
    fn serialize_response(&self, items: Vec<Value>, render: &Render<'_>) -> Value;

    /// Build the error response for a failed request.
    fn make_error_response(&self, failure: &Failure, status: StatusCode) -> Response;

    /// Render a handler result into body bytes.
    fn serialize(&self, result: Resource, render: &Render<'_>) -> Result<Bytes, Failure> {
        let configured = render.endpoint().serializer();
        let mut items = Vec::new();
        for (index, item) in result.into_items().into_iter().enumerate() {
            let inferred;
            let schema: &Schema = match configured {
                Some(schema) => schema,
                None => {
                    inferred = Schema::inferred(&item).frame(|| format!("item {index}"))?;
                    &inferred
                }
            };
            let bound = schema
                .bind(&item)
                .frame(|| format!("bind `{}` to item {index}", schema.name()))?;
            items.push(
                self.serialize_item(&bound, render)
                    .frame(|| format!("item {index}"))?,
            );
        }
        let envelope = self.serialize_response(items, render);
        serde_json::to_vec(&envelope)
            .map(Bytes::from)
            .map_err(|err| PipelineError::unserializable("the response envelope", err.to_string()))
            .frame(|| format!("encode {}", self.media_type()))
    }

    /// Successful response carrying `body`.
    fn make_response(&self, body: Bytes) -> Response {
        with_content_type(http::Response::new(body), self.media_type())
    }
}

/// A JSON response with the given status and media type.
pub fn json_response(status: StatusCode, media_type: &str, body: &Value) -> Response {
    // Serializing a `Value` cannot fail.
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = with_content_type(http::Response::new(Bytes::from(bytes)), media_type);
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response, media_type: &str) -> Response {
    match HeaderValue::from_str(media_type) {
        Ok(value) => {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        Err(_) => tracing::warn!(media_type, "media type is not a valid header value"),
    }
    response
}

/// Media type to content type, in priority order.
///
/// Order only matters for negotiation ties. Re-inserting a key replaces the
/// entry in place.
#[derive(Clone, Default)]
pub struct ContentTypeMap {
    entries: IndexMap<String, Arc<dyn ContentType>>,
}

impl ContentTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `text/html` and `application/json` to [`Json`],
    /// `application/vnd.collection+json` to [`CollectionJson`].
    pub fn builtin() -> Self {
        let json: Arc<dyn ContentType> = Arc::new(Json);
        let mut map = Self::new();
        map.insert_as("text/html", json.clone());
        map.insert_as(Json::MEDIA_TYPE, json);
        map.insert(CollectionJson);
        map
    }

    /// Insert under the content type's own media type.
    pub fn insert(&mut self, content_type: impl ContentType + 'static) {
        let content_type: Arc<dyn ContentType> = Arc::new(content_type);
        self.insert_as(content_type.media_type().to_string(), content_type);
    }

    /// Insert under an explicit key, e.g. to serve JSON for `text/html`.
    pub fn insert_as(&mut self, key: impl Into<String>, content_type: Arc<dyn ContentType>) {
        self.entries.insert(key.into(), content_type);
    }

    /// Layer every entry of `overrides` on top of this map.
    pub fn extend(&mut self, overrides: &ContentTypeMap) {
        for (key, content_type) in &overrides.entries {
            self.entries.insert(key.clone(), content_type.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn ContentType>> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|key| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick the content type that best satisfies `accept`.
    pub fn negotiate(&self, accept: &AcceptPreferences) -> Result<Arc<dyn ContentType>, PipelineError> {
        accept
            .best_match(self.keys())
            .and_then(|key| self.get(key))
            .cloned()
            .ok_or_else(|| PipelineError::ContentNegotiation {
                accept: accept.to_string(),
                offered: self.keys().collect::<Vec<_>>().join(", "),
            })
    }
}

impl fmt::Debug for ContentTypeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(key, content_type)| (key, content_type.media_type())),
            )
            .finish()
    }
}

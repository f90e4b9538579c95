//! Per-handler configuration and the request pipeline.
//!
//! An [`Endpoint`] is shared by every request to its handler and never
//! changes while requests run. Everything a single request needs lives in the
//! [`RequestScope`] that [`Endpoint::setup_request`] returns and
//! [`Endpoint::teardown_request`] consumes.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::StatusPolicy;
use crate::content_type::{ContentType, ContentTypeMap, Json, Render, Response};
use crate::context::RequestContext;
use crate::error::{BoxError, Failure, PipelineError, ResultExt};
use crate::filter::{FilterSet, ValidatedFilters};
use crate::path::PathTemplate;
use crate::resource::Resource;
use crate::schema::{Deserializer, Schema};

/// What a handler returns.
pub type HandlerResult = Result<Resource, BoxError>;

/// A type-erased endpoint handler.
pub type HandlerFn = Arc<dyn Fn(&RequestScope<'_>) -> HandlerResult + Send + Sync>;

/// Configuration bundle for one named handler.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    path: PathTemplate,
    declared: bool,
    serializer: Option<Arc<Schema>>,
    deserializer: Option<Arc<Deserializer>>,
    filter_set: Option<Arc<FilterSet>>,
    content_types: ContentTypeMap,
}

impl Endpoint {
    /// An endpoint offering the built-in content types.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_content_types(name, ContentTypeMap::builtin())
    }

    /// An endpoint starting from a copy of `defaults`.
    pub fn with_content_types(name: impl Into<String>, defaults: ContentTypeMap) -> Self {
        Self {
            name: name.into(),
            path: PathTemplate::default(),
            declared: false,
            serializer: None,
            deserializer: None,
            filter_set: None,
            content_types: defaults,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    /// Whether a path has been declared for this endpoint.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn serializer(&self) -> Option<&Schema> {
        self.serializer.as_deref()
    }

    pub fn deserializer(&self) -> Option<&Deserializer> {
        self.deserializer.as_deref()
    }

    pub fn filter_set(&self) -> Option<&FilterSet> {
        self.filter_set.as_deref()
    }

    pub fn content_types(&self) -> &ContentTypeMap {
        &self.content_types
    }

    pub fn set_path(&mut self, path: PathTemplate) {
        self.path = path;
        self.declared = true;
    }

    pub fn set_serializer(&mut self, schema: Arc<Schema>) {
        self.serializer = Some(schema);
    }

    pub fn set_deserializer(&mut self, deserializer: Arc<Deserializer>) {
        self.deserializer = Some(deserializer);
    }

    pub fn set_filter_set(&mut self, filter_set: Arc<FilterSet>) {
        self.filter_set = Some(filter_set);
    }

    /// Offer `content_type` under its media type, replacing any existing entry.
    pub fn add_content_type(&mut self, content_type: Arc<dyn ContentType>) {
        self.content_types
            .insert_as(content_type.media_type().to_string(), content_type);
    }

    /// Negotiate a content type, validate filters and read the payload.
    pub fn setup_request<'r>(&'r self, request: &'r RequestContext) -> Result<RequestScope<'r>, SetupError> {
        let content_type = self
            .content_types
            .negotiate(request.accept())
            .frame(|| "negotiate content type")
            .map_err(SetupError::before_negotiation)?;
        debug!(
            accept = %request.accept(),
            media_type = content_type.media_type(),
            "negotiated content type"
        );

        let filters = match &self.filter_set {
            Some(filter_set) => match filter_set
                .validate_inputs(request)
                .frame(|| format!("validate filter set `{}`", filter_set.name()))
            {
                Ok(filters) => Some(filters),
                Err(failure) => return Err(SetupError::after_negotiation(&content_type, failure)),
            },
            None => None,
        };

        let payload = match (&self.deserializer, request.body()) {
            (Some(deserializer), Some(body)) => match deserializer
                .deserialize(body)
                .frame(|| format!("deserialize `{}`", deserializer.schema().name()))
            {
                Ok(payload) => Some(payload),
                Err(failure) => return Err(SetupError::after_negotiation(&content_type, failure)),
            },
            _ => None,
        };

        Ok(RequestScope {
            endpoint: self,
            request,
            content_type,
            filters,
            payload,
        })
    }

    /// Release the request's state.
    pub fn teardown_request(&self, scope: RequestScope<'_>) {
        debug!(media_type = scope.content_type.media_type(), "request finished");
        drop(scope);
    }

    /// Run one request through setup, the handler, rendering and teardown.
    ///
    /// Never fails: every failure becomes an error response.
    pub fn handle<F>(&self, handler: F, request: &RequestContext, errors: &ErrorRendering) -> Response
    where
        F: FnOnce(&RequestScope<'_>) -> HandlerResult,
    {
        let span = tracing::debug_span!("endpoint", name = %self.name, path = %self.path);
        let _guard = span.enter();

        let scope = match self.setup_request(request) {
            Ok(scope) => scope,
            Err(SetupError { negotiated, failure }) => {
                let content_type = negotiated.unwrap_or_else(|| errors.fallback.clone());
                return self.error_response(content_type.as_ref(), failure, errors);
            }
        };

        let response = match self.run(handler, &scope) {
            Ok(response) => response,
            Err(failure) => self.error_response(scope.content_type.as_ref(), failure, errors),
        };
        self.teardown_request(scope);
        response
    }

    fn run<F>(&self, handler: F, scope: &RequestScope<'_>) -> Result<Response, Failure>
    where
        F: FnOnce(&RequestScope<'_>) -> HandlerResult,
    {
        let result = handler(scope)
            .map_err(PipelineError::from_handler)
            .frame(|| format!("handler `{}`", self.name))?;
        let content_type = scope.content_type();
        let body = content_type
            .serialize(result, &scope.render())
            .frame(|| format!("render {}", content_type.media_type()))?;
        Ok(content_type.make_response(body))
    }

    fn error_response(&self, content_type: &dyn ContentType, failure: Failure, errors: &ErrorRendering) -> Response {
        let status = errors.status_policy.status_for(failure.kind());
        warn!(
            kind = %failure.kind(),
            error = %failure.error(),
            status = status.as_u16(),
            "request failed"
        );
        content_type.make_error_response(&failure, status)
    }
}

/// State owned by one in-flight request.
pub struct RequestScope<'r> {
    endpoint: &'r Endpoint,
    request: &'r RequestContext,
    content_type: Arc<dyn ContentType>,
    filters: Option<ValidatedFilters>,
    payload: Option<Map<String, Value>>,
}

impl<'r> RequestScope<'r> {
    pub fn endpoint(&self) -> &'r Endpoint {
        self.endpoint
    }

    pub fn request(&self) -> &'r RequestContext {
        self.request
    }

    /// The negotiated content type.
    pub fn content_type(&self) -> &dyn ContentType {
        self.content_type.as_ref()
    }

    /// Validated filters, if the endpoint has a filter set.
    pub fn filters(&self) -> Option<&ValidatedFilters> {
        self.filters.as_ref()
    }

    /// A single validated filter value.
    pub fn filter(&self, name: &str) -> Option<&Value> {
        self.filters.as_ref().and_then(|filters| filters.get(name))
    }

    /// The deserialized request body, if the endpoint has a deserializer and
    /// the request carried a body.
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()
    }

    pub fn render(&self) -> Render<'r> {
        Render::new(self.endpoint, self.request)
    }
}

impl fmt::Debug for RequestScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("endpoint", &self.endpoint.name)
            .field("url", &self.request.url())
            .field("content_type", &self.content_type.media_type())
            .field("filters", &self.filters)
            .field("payload", &self.payload)
            .finish()
    }
}

/// A failed setup, with the content type if negotiation got that far.
#[derive(Debug)]
pub struct SetupError {
    pub negotiated: Option<Arc<dyn ContentType>>,
    pub failure: Failure,
}

impl SetupError {
    fn before_negotiation(failure: Failure) -> Self {
        Self {
            negotiated: None,
            failure,
        }
    }

    fn after_negotiation(content_type: &Arc<dyn ContentType>, failure: Failure) -> Self {
        Self {
            negotiated: Some(content_type.clone()),
            failure,
        }
    }
}

/// How failures are turned into responses.
#[derive(Debug, Clone)]
pub struct ErrorRendering {
    status_policy: StatusPolicy,
    fallback: Arc<dyn ContentType>,
}

impl ErrorRendering {
    pub fn new(status_policy: StatusPolicy, fallback: Arc<dyn ContentType>) -> Self {
        Self {
            status_policy,
            fallback,
        }
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Content type for failures raised before negotiation completes.
    pub fn fallback(&self) -> &dyn ContentType {
        self.fallback.as_ref()
    }
}

impl Default for ErrorRendering {
    fn default() -> Self {
        Self::new(StatusPolicy::default(), Arc::new(Json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::Field;
    use http::StatusCode;
    use http::header::CONTENT_TYPE;
    use serde_json::json;

    fn article_endpoint() -> Endpoint {
        let mut endpoint = Endpoint::new("article");
        endpoint.set_path(PathTemplate::parse("/articles/{id}"));
        endpoint.set_serializer(Arc::new(
            Schema::builder("ArticleSerializer")
                .field(Field::integer("id").primary_key())
                .field(Field::string("title"))
                .build()
                .unwrap(),
        ));
        endpoint.set_filter_set(Arc::new(
            FilterSet::builder("ArticleFilters")
                .filter(Field::integer("author"))
                .build()
                .unwrap(),
        ));
        endpoint
    }

    fn request(query: &str) -> RequestContext {
        RequestContext::new(
            format!("http://localhost/articles/1{query}"),
            "http://localhost/",
        )
    }

    fn body(response: &Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_setup_builds_scope() {
        let endpoint = article_endpoint();
        let request = request("?author=3").with_accept("application/vnd.collection+json");
        let scope = endpoint.setup_request(&request).unwrap();

        assert_eq!(
            scope.content_type().media_type(),
            "application/vnd.collection+json"
        );
        assert_eq!(scope.filter("author"), Some(&json!(3)));
        assert!(scope.payload().is_none());
        endpoint.teardown_request(scope);
    }

    #[test]
    fn test_setup_failure_keeps_negotiated_type() {
        let endpoint = article_endpoint();
        let request = request("?author=abc").with_accept("application/vnd.collection+json");
        let err = endpoint.setup_request(&request).unwrap_err();

        assert_eq!(err.failure.kind(), ErrorKind::FilterValidation);
        assert_eq!(
            err.negotiated.unwrap().media_type(),
            "application/vnd.collection+json"
        );
    }

    #[test]
    fn test_handle_success() {
        let endpoint = article_endpoint();
        let response = endpoint.handle(
            |_| Ok(Resource::from(json!({"id": 1, "title": "Hello"}))),
            &request(""),
            &ErrorRendering::default(),
        );

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body(&response), json!({"items": [{"id": 1, "title": "Hello"}]}));
    }

    #[test]
    fn test_handler_error_rendered() {
        let endpoint = article_endpoint();
        let response = endpoint.handle(
            |_| Err("database unavailable".into()),
            &request("").with_accept("application/vnd.collection+json"),
            &ErrorRendering::default(),
        );

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value = body(&response);
        assert_eq!(value["collection"]["title"], "HandlerError");
        assert_eq!(value["collection"]["message"], "database unavailable");
        assert_eq!(value["collection"]["stacktrace"], json!(["handler `article`"]));
    }

    #[test]
    fn test_negotiation_failure_uses_fallback() {
        let endpoint = article_endpoint();
        let errors = ErrorRendering::new(StatusPolicy::Classified, Arc::new(Json));
        let mut called = false;
        let response = endpoint.handle(
            |_| {
                called = true;
                Ok(Resource::empty())
            },
            &request("").with_accept("image/png"),
            &errors,
        );

        assert!(!called);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body(&response)["error"], "ContentNegotiationError");
    }

    #[test]
    fn test_render_failure_carries_frames() {
        let endpoint = article_endpoint();
        let response = endpoint.handle(
            |_| Ok(Resource::from(json!({"id": 1}))),
            &request(""),
            &ErrorRendering::default(),
        );

        let value = body(&response);
        assert_eq!(value["error"], "MissingFieldError");
        assert_eq!(
            value["stacktrace"],
            json!(["render application/json", "bind `ArticleSerializer` to item 0"])
        );
    }

    #[test]
    fn test_payload_deserialized() {
        let mut endpoint = Endpoint::new("create");
        endpoint.set_deserializer(Arc::new(Deserializer::new(
            Schema::builder("ArticleInput")
                .field(Field::string("title"))
                .build()
                .unwrap(),
        )));

        let request = request("").with_body(r#"{"title": "Draft"}"#);
        let scope = endpoint.setup_request(&request).unwrap();
        assert_eq!(scope.payload().unwrap()["title"], "Draft");
        endpoint.teardown_request(scope);

        let request = RequestContext::new("http://localhost/", "http://localhost/").with_body("{");
        let err = endpoint.setup_request(&request).unwrap_err();
        assert_eq!(err.failure.kind(), ErrorKind::InvalidPayload);
    }
}

//! Handler registry and route wiring.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, RegistryConfig};
use crate::content_type::{CollectionJson, ContentType, ContentTypeMap, Json, Response};
use crate::context::RequestContext;
use crate::endpoint::{Endpoint, ErrorRendering, HandlerFn, HandlerResult, RequestScope};
use crate::filter::FilterSet;
use crate::path::PathTemplate;
use crate::schema::{Deserializer, Schema};

/// Errors raised while declaring endpoints.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("content type `{0}` does not name a valid media type")]
    InvalidMediaType(String),

    #[error("a router has already been attached to this registry")]
    RouterAlreadyAttached,
}

/// Something routes can be registered with.
pub trait Router {
    fn register_route(&mut self, path: &PathTemplate, name: &str, handler: BoundHandler);
}

/// A handler wired to its endpoint. Cheap to clone; this is what a hosting
/// server invokes per request.
#[derive(Clone)]
pub struct BoundHandler {
    name: String,
    endpoint: Arc<RwLock<Endpoint>>,
    handler: HandlerFn,
    errors: ErrorRendering,
}

impl BoundHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one request. Always produces a response.
    pub fn call(&self, request: &RequestContext) -> Response {
        let endpoint = self.endpoint.read().unwrap_or_else(PoisonError::into_inner);
        endpoint.handle(|scope| (self.handler)(scope), request, &self.errors)
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A route registered with a [`RouteTable`].
#[derive(Debug, Clone)]
pub struct Route {
    pub path: PathTemplate,
    pub name: String,
    pub handler: BoundHandler,
}

/// In-memory, ordered route table.
///
/// Clones share the same table, so a host can keep one clone and hand the
/// other to [`Registry::init_router`].
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<Vec<Route>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the registered routes, in registration order.
    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<BoundHandler> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|route| route.name == name)
            .map(|route| route.handler.clone())
    }

    /// Invoke the handler registered under `name`.
    pub fn dispatch(&self, name: &str, request: &RequestContext) -> Option<Response> {
        self.get(name).map(|handler| handler.call(request))
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Router for RouteTable {
    fn register_route(&mut self, path: &PathTemplate, name: &str, handler: BoundHandler) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        // Redeclaring a name rewires it in place.
        match routes.iter_mut().find(|route| route.name == name) {
            Some(route) => {
                route.path = path.clone();
                route.handler = handler;
            }
            None => routes.push(Route {
                path: path.clone(),
                name: name.to_string(),
                handler,
            }),
        }
    }
}

/// A component that can be attached to an endpoint by name.
#[derive(Debug, Clone)]
pub enum Component {
    Serializer(Arc<Schema>),
    Deserializer(Arc<Deserializer>),
    FilterSet(Arc<FilterSet>),
    ContentType(Arc<dyn ContentType>),
}

impl From<Schema> for Component {
    fn from(schema: Schema) -> Self {
        Component::Serializer(Arc::new(schema))
    }
}

impl From<Deserializer> for Component {
    fn from(deserializer: Deserializer) -> Self {
        Component::Deserializer(Arc::new(deserializer))
    }
}

impl From<FilterSet> for Component {
    fn from(filter_set: FilterSet) -> Self {
        Component::FilterSet(Arc::new(filter_set))
    }
}

impl From<Arc<dyn ContentType>> for Component {
    fn from(content_type: Arc<dyn ContentType>) -> Self {
        Component::ContentType(content_type)
    }
}

impl From<Json> for Component {
    fn from(json: Json) -> Self {
        Component::ContentType(Arc::new(json))
    }
}

impl From<CollectionJson> for Component {
    fn from(collection: CollectionJson) -> Self {
        Component::ContentType(Arc::new(collection))
    }
}

/// Maps handler names to endpoints.
///
/// Endpoints are created on first mention by any registration method, so
/// components can be registered before or after the endpoint is declared.
///
/// ```
/// use restform_core::{Field, Registry, RequestContext, Resource, RouteTable, Schema};
///
/// let routes = RouteTable::new();
/// let mut registry = Registry::new();
/// registry.init_router(routes.clone()).unwrap();
///
/// registry.register_serializer(
///     "hello",
///     Schema::builder("Hello").field(Field::plain("hello")).build().unwrap(),
/// );
/// registry.declare_endpoint("/hello", "hello", |_| {
///     Ok(Resource::from(serde_json::json!({"hello": "world"})))
/// });
///
/// let request = RequestContext::new("http://localhost/hello", "http://localhost/");
/// let response = routes.dispatch("hello", &request).unwrap();
/// assert_eq!(&response.body()[..], br#"{"items":[{"hello":"world"}]}"#);
/// ```
pub struct Registry {
    endpoints: IndexMap<String, Arc<RwLock<Endpoint>>>,
    /// Declared handlers, in declaration order.
    handlers: IndexMap<String, BoundHandler>,
    defaults: ContentTypeMap,
    errors: ErrorRendering,
    router: Option<Box<dyn Router + Send + Sync>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the built-in content types and uniform 500 errors.
    pub fn new() -> Self {
        Self {
            endpoints: IndexMap::new(),
            handlers: IndexMap::new(),
            defaults: ContentTypeMap::builtin(),
            errors: ErrorRendering::default(),
            router: None,
        }
    }

    pub fn with_config(config: &RegistryConfig) -> Result<Self, ConfigError> {
        let defaults = config.default_content_types()?;
        let errors = config.error_rendering(&defaults)?;
        Ok(Self {
            defaults,
            errors,
            ..Self::new()
        })
    }

    /// The content types every new endpoint starts from.
    pub fn default_content_types(&self) -> &ContentTypeMap {
        &self.defaults
    }

    /// Declare the endpoint `name` at `path`, served by `handler`.
    ///
    /// The returned handler is also registered with the router once one is
    /// attached.
    pub fn declare_endpoint<F>(&mut self, path: impl Into<PathTemplate>, name: &str, handler: F) -> BoundHandler
    where
        F: Fn(&RequestScope<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let path = path.into();
        let endpoint = self.endpoint_slot(name);
        {
            let mut endpoint = endpoint.write().unwrap_or_else(PoisonError::into_inner);
            if endpoint.is_declared() {
                warn!(
                    name,
                    previous = %endpoint.path(),
                    path = %path,
                    "endpoint declared twice, merging configuration"
                );
            }
            endpoint.set_path(path.clone());
        }

        let bound = BoundHandler {
            name: name.to_string(),
            endpoint,
            handler: Arc::new(handler),
            errors: self.errors.clone(),
        };
        self.handlers.insert(name.to_string(), bound.clone());
        if let Some(router) = self.router.as_mut() {
            info!(name, path = %path, "wiring route");
            router.register_route(&path, name, bound.clone());
        }
        bound
    }

    pub fn register_serializer(&mut self, name: &str, schema: impl Into<Arc<Schema>>) -> &mut Self {
        let schema = schema.into();
        self.update(name, |endpoint| endpoint.set_serializer(schema));
        self
    }

    pub fn register_deserializer(&mut self, name: &str, deserializer: impl Into<Arc<Deserializer>>) -> &mut Self {
        let deserializer = deserializer.into();
        self.update(name, |endpoint| endpoint.set_deserializer(deserializer));
        self
    }

    pub fn register_filter_set(&mut self, name: &str, filter_set: impl Into<Arc<FilterSet>>) -> &mut Self {
        let filter_set = filter_set.into();
        self.update(name, |endpoint| endpoint.set_filter_set(filter_set));
        self
    }

    /// Offer an extra content type on one endpoint, overriding the defaults
    /// for its media type.
    pub fn register_content_type(
        &mut self,
        name: &str,
        content_type: Arc<dyn ContentType>,
    ) -> Result<&mut Self, RegistryError> {
        let media_type = content_type.media_type();
        if media_type.parse::<mime::Mime>().is_err() {
            return Err(RegistryError::InvalidMediaType(media_type.to_string()));
        }
        self.update(name, |endpoint| endpoint.add_content_type(content_type));
        Ok(self)
    }

    /// Register any component, dispatching on its kind.
    pub fn register(&mut self, name: &str, component: impl Into<Component>) -> Result<&mut Self, RegistryError> {
        match component.into() {
            Component::Serializer(schema) => Ok(self.register_serializer(name, schema)),
            Component::Deserializer(deserializer) => Ok(self.register_deserializer(name, deserializer)),
            Component::FilterSet(filter_set) => Ok(self.register_filter_set(name, filter_set)),
            Component::ContentType(content_type) => self.register_content_type(name, content_type),
        }
    }

    /// Attach the router and wire every endpoint declared so far, in
    /// declaration order. Endpoints declared later are wired immediately.
    pub fn init_router(&mut self, router: impl Router + Send + Sync + 'static) -> Result<(), RegistryError> {
        if self.router.is_some() {
            return Err(RegistryError::RouterAlreadyAttached);
        }
        let mut router: Box<dyn Router + Send + Sync> = Box::new(router);
        for (name, bound) in &self.handlers {
            let endpoint = bound.endpoint.read().unwrap_or_else(PoisonError::into_inner);
            info!(name = name.as_str(), path = %endpoint.path(), "wiring route");
            router.register_route(endpoint.path(), name, bound.clone());
        }
        self.router = Some(router);
        Ok(())
    }

    pub fn has_router(&self) -> bool {
        self.router.is_some()
    }

    /// Read access to an endpoint's current configuration.
    pub fn endpoint(&self, name: &str) -> Option<RwLockReadGuard<'_, Endpoint>> {
        self.endpoints
            .get(name)
            .map(|endpoint| endpoint.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every endpoint name, in order of first mention.
    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(|name| name.as_str())
    }

    /// The handler declared under `name`.
    pub fn handler(&self, name: &str) -> Option<&BoundHandler> {
        self.handlers.get(name)
    }

    fn endpoint_slot(&mut self, name: &str) -> Arc<RwLock<Endpoint>> {
        let defaults = &self.defaults;
        self.endpoints
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Endpoint::with_content_types(name, defaults.clone()))))
            .clone()
    }

    fn update(&mut self, name: &str, apply: impl FnOnce(&mut Endpoint)) {
        let endpoint = self.endpoint_slot(name);
        let mut endpoint = endpoint.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut endpoint);
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("defaults", &self.defaults)
            .field("errors", &self.errors)
            .field("has_router", &self.router.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::resource::Resource;
    use serde_json::{Value, json};

    fn hello_schema() -> Schema {
        Schema::builder("HelloSerializer")
            .field(Field::plain("hello"))
            .build()
            .unwrap()
    }

    fn hello(_: &RequestScope<'_>) -> HandlerResult {
        Ok(Resource::from(json!({"hello": "world"})))
    }

    fn request() -> RequestContext {
        RequestContext::new("http://localhost/hello", "http://localhost/")
    }

    #[test]
    fn test_registration_order_is_free() {
        let mut before = Registry::new();
        before.register_serializer("hello", hello_schema());
        let bound_before = before.declare_endpoint("/hello", "hello", hello);

        let mut after = Registry::new();
        let bound_after = after.declare_endpoint("/hello", "hello", hello);
        after.register_serializer("hello", hello_schema());

        assert_eq!(
            bound_before.call(&request()).body(),
            bound_after.call(&request()).body()
        );
        assert_eq!(after.endpoint_names().collect::<Vec<_>>(), vec!["hello"]);
    }

    #[test]
    fn test_delayed_router_wiring() {
        let routes = RouteTable::new();
        let mut registry = Registry::new();
        registry.declare_endpoint("/first", "first", hello);
        registry.declare_endpoint("/second/{id}", "second", hello);
        assert!(routes.is_empty());

        registry.init_router(routes.clone()).unwrap();
        registry.declare_endpoint("/third", "third", hello);

        let names: Vec<_> = routes.routes().into_iter().map(|route| route.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(routes.routes()[1].path.route_pattern(), "/second/{id}");
        assert!(matches!(
            registry.init_router(RouteTable::new()),
            Err(RegistryError::RouterAlreadyAttached)
        ));
    }

    #[test]
    fn test_redeclaration_merges() {
        let routes = RouteTable::new();
        let mut registry = Registry::new();
        registry.init_router(routes.clone()).unwrap();
        registry.register_serializer("hello", hello_schema());
        registry.declare_endpoint("/hello", "hello", hello);
        registry.declare_endpoint("/hi", "hello", hello);

        assert_eq!(routes.len(), 1);
        let endpoint = registry.endpoint("hello").unwrap();
        assert_eq!(endpoint.path().as_str(), "/hi");
        assert!(endpoint.serializer().is_some());
    }

    #[test]
    fn test_register_dispatches_on_component() {
        let mut registry = Registry::new();
        registry
            .register("hello", hello_schema())
            .unwrap()
            .register(
                "hello",
                FilterSet::builder("HelloFilters")
                    .filter(Field::string("q"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let endpoint = registry.endpoint("hello").unwrap();
        assert_eq!(endpoint.serializer().unwrap().name(), "HelloSerializer");
        assert_eq!(endpoint.filter_set().unwrap().name(), "HelloFilters");
    }

    #[test]
    fn test_endpoint_content_type_override() {
        #[derive(Debug)]
        struct Hal;

        impl ContentType for Hal {
            fn media_type(&self) -> &str {
                "application/hal+json"
            }

            fn serialize_item(
                &self,
                item: &crate::schema::BoundSerializer<'_>,
                render: &crate::content_type::Render<'_>,
            ) -> Result<Value, crate::error::Failure> {
                Ok(Value::Object(item.to_map(render.request())?))
            }

            fn serialize_response(&self, items: Vec<Value>, _: &crate::content_type::Render<'_>) -> Value {
                json!({"_embedded": {"items": items}})
            }

            fn make_error_response(&self, failure: &crate::error::Failure, status: http::StatusCode) -> Response {
                crate::content_type::json_response(status, self.media_type(), &json!({"error": failure.message()}))
            }
        }

        let mut registry = Registry::new();
        registry.register_serializer("hello", hello_schema());
        registry.register_content_type("hello", Arc::new(Hal)).unwrap();
        let bound = registry.declare_endpoint("/hello", "hello", hello);

        let response = bound.call(&request().with_accept("application/hal+json"));
        let value: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(value, json!({"_embedded": {"items": [{"hello": "world"}]}}));

        // Other endpoints are unaffected.
        registry.declare_endpoint("/other", "other", hello);
        assert!(registry.endpoint("other").unwrap().content_types().get("application/hal+json").is_none());
    }
}

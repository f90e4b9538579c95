//! Integration tests driving full requests through a Registry.

use std::sync::Arc;

use http::StatusCode;
use http::header::CONTENT_TYPE;
use restform::prelude::*;
use restform::{
    BoundHandler, BoundSerializer, ErrorRendering, Failure, Render, Response, json_response,
};
use serde_json::{Value, json};

const ROOT: &str = "http://api.example.test/";

// ============================================================================
// Fixtures
// ============================================================================

#[derive(serde::Serialize, Record)]
struct TestObject {
    field: String,
    string: String,
    uri_field: String,
}

fn test_object() -> TestObject {
    TestObject {
        field: "field".to_string(),
        string: "string".to_string(),
        uri_field: "http://api.example.com/".to_string(),
    }
}

fn supported_fields() -> Schema {
    Schema::builder("SupportedFieldsSerializer")
        .field(Field::plain("field").primary_key())
        .field(Field::string("string"))
        .field(Field::uri("uri_field"))
        .field(Field::related_uri("related_uri_field", "home_obj"))
        .build()
        .unwrap()
}

fn home_dict(_: &RequestScope<'_>) -> HandlerResult {
    Ok(Resource::from(json!({"hello": "world"})))
}

fn home_list(_: &RequestScope<'_>) -> HandlerResult {
    Ok(Resource::from(json!([{"hello": "world"}])))
}

fn home_obj(_: &RequestScope<'_>) -> HandlerResult {
    Ok(Resource::record(test_object()))
}

fn test_api() -> (Registry, RouteTable) {
    let routes = RouteTable::new();
    let mut api = Registry::new();
    api.init_router(routes.clone()).unwrap();

    api.declare_endpoint("/dict", "home_dict", home_dict);
    api.declare_endpoint("/list", "home_list", home_list);
    api.declare_endpoint("/obj", "home_obj", home_obj);

    api.register_serializer("dict_fields", supported_fields());
    api.declare_endpoint("/dict/fields", "dict_fields", |_| {
        Ok(Resource::from(json!({
            "field": "field",
            "string": "string",
            "uri_field": "http://api.example.com/",
        })))
    });

    api.declare_endpoint("/list/fields", "list_fields", |_| {
        Ok(Resource::from(json!([{
            "field": "field",
            "string": "string",
            "uri_field": "http://api.example.com/",
        }])))
    });
    api.register_serializer("list_fields", supported_fields());

    api.register_serializer("obj_fields", supported_fields());
    api.declare_endpoint("/obj/fields", "obj_fields", |_| {
        Ok(Resource::records(vec![test_object()]))
    });

    (api, routes)
}

fn get(routes: &RouteTable, name: &str, path: &str, accept: &str) -> Response {
    let request = RequestContext::new(format!("{ROOT}{}", path.trim_start_matches('/')), ROOT)
        .with_accept(accept);
    routes.dispatch(name, &request).expect("route is registered")
}

fn body(response: &Response) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

// ============================================================================
// Endpoint declaration
// ============================================================================

#[test]
fn test_default_endpoint() {
    let mut api = Registry::new();
    api.declare_endpoint("/", "home", home_dict);

    assert_eq!(api.endpoint_names().collect::<Vec<_>>(), vec!["home"]);
    let endpoint = api.endpoint("home").unwrap();
    assert!(endpoint.serializer().is_none());
    assert!(endpoint.deserializer().is_none());
    assert!(endpoint.filter_set().is_none());
    assert_eq!(
        endpoint.content_types().keys().collect::<Vec<_>>(),
        api.default_content_types().keys().collect::<Vec<_>>()
    );
}

#[test]
fn test_endpoint_with_components() {
    let mut api = Registry::new();
    api.declare_endpoint("/", "home", home_dict);
    api.register("home", Schema::builder("TestSerializer").build().unwrap())
        .unwrap();
    api.register(
        "home",
        Deserializer::new(Schema::builder("TestDeserializer").build().unwrap()),
    )
    .unwrap();
    api.register("home", FilterSet::builder("TestFilterSet").build().unwrap())
        .unwrap();

    assert_eq!(api.endpoint_names().count(), 1);
    let endpoint = api.endpoint("home").unwrap();
    assert_eq!(endpoint.serializer().unwrap().name(), "TestSerializer");
    assert_eq!(
        endpoint.deserializer().unwrap().schema().name(),
        "TestDeserializer"
    );
    assert_eq!(endpoint.filter_set().unwrap().name(), "TestFilterSet");
}

#[derive(Debug)]
struct PlainText(&'static str);

impl ContentType for PlainText {
    fn media_type(&self) -> &str {
        self.0
    }

    fn serialize_item(&self, item: &BoundSerializer<'_>, render: &Render<'_>) -> Result<Value, Failure> {
        Ok(Value::Object(item.to_map(render.request())?))
    }

    fn serialize_response(&self, items: Vec<Value>, _: &Render<'_>) -> Value {
        Value::Array(items)
    }

    fn make_error_response(&self, failure: &Failure, status: StatusCode) -> Response {
        json_response(status, self.media_type(), &json!(failure.message()))
    }
}

#[test]
fn test_endpoint_adds_content_type() {
    let mut api = Registry::new();
    api.register_content_type("home", Arc::new(PlainText("application/test")))
        .unwrap();
    api.declare_endpoint("/", "home", home_dict);

    let endpoint = api.endpoint("home").unwrap();
    assert_eq!(
        endpoint.content_types().keys().collect::<Vec<_>>(),
        vec![
            "text/html",
            "application/json",
            "application/vnd.collection+json",
            "application/test"
        ]
    );
}

#[test]
fn test_endpoint_overrides_content_type() {
    let mut api = Registry::new();
    api.declare_endpoint("/", "home", home_dict);
    api.register_content_type("home", Arc::new(PlainText("application/json")))
        .unwrap();

    let endpoint = api.endpoint("home").unwrap();
    assert_eq!(endpoint.content_types().len(), 3);
    // The override keeps its position in the map.
    assert_eq!(endpoint.content_types().keys().nth(1), Some("application/json"));
}

#[test]
fn test_invalid_content_type_rejected() {
    let mut api = Registry::new();
    let err = api
        .register_content_type("home", Arc::new(PlainText("not a media type")))
        .unwrap_err();
    assert!(matches!(err, restform::RegistryError::InvalidMediaType(_)));
}

#[test]
fn test_router_attached_after_declarations() {
    let mut api = Registry::new();
    api.declare_endpoint("/", "home", home_dict);

    let routes = RouteTable::new();
    api.init_router(routes.clone()).unwrap();
    api.declare_endpoint("/after", "after", |_| {
        Ok(Resource::from(json!({"after": "world"})))
    });

    assert_eq!(api.endpoint_names().count(), 2);
    let names: Vec<_> = routes.routes().into_iter().map(|route| route.name).collect();
    assert_eq!(names, vec!["home", "after"]);

    let response = get(&routes, "after", "/after", "application/json");
    assert_eq!(body(&response), json!({"items": [{"after": "world"}]}));
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn test_json_default_endpoint_dict() {
    let (_api, routes) = test_api();
    let response = get(&routes, "home_dict", "/dict", "application/json");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(&response.body()[..], br#"{"items":[{"hello":"world"}]}"#);
}

#[test]
fn test_json_default_endpoint_list() {
    let (_api, routes) = test_api();
    let response = get(&routes, "home_list", "/list", "application/json");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), json!({"items": [{"hello": "world"}]}));
}

#[test]
fn test_json_default_endpoint_obj() {
    let (_api, routes) = test_api();
    let response = get(&routes, "home_obj", "/obj", "application/json");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&response)["error"], "UnserializableResultError");
}

#[test]
fn test_json_fields_endpoints() {
    let (_api, routes) = test_api();
    for (name, path) in [
        ("dict_fields", "/dict/fields"),
        ("list_fields", "/list/fields"),
        ("obj_fields", "/obj/fields"),
    ] {
        let response = get(&routes, name, path, "application/json");
        assert_eq!(response.status(), StatusCode::OK, "{name}");
        assert_eq!(
            body(&response),
            json!({
                "items": [{
                    "field": "field",
                    "string": "string",
                    "uri_field": "http://api.example.com/",
                    "related_uri_field": "http://api.example.test/home_obj",
                }]
            }),
            "{name}"
        );
    }
}

#[test]
fn test_html_served_as_json() {
    let (_api, routes) = test_api();
    let response = get(&routes, "home_dict", "/dict", "text/html");
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(body(&response), json!({"items": [{"hello": "world"}]}));
}

// ============================================================================
// Collection+JSON
// ============================================================================

const COLLECTION: &str = "application/vnd.collection+json";

#[test]
fn test_collection_default_endpoints_fail() {
    let (_api, routes) = test_api();
    for (name, path, kind) in [
        ("home_dict", "/dict", "NoPrimaryKeyError"),
        ("home_list", "/list", "NoPrimaryKeyError"),
        ("home_obj", "/obj", "UnserializableResultError"),
    ] {
        let response = get(&routes, name, path, COLLECTION);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{name}");
        assert_eq!(response.headers()[CONTENT_TYPE], COLLECTION);
        let value = body(&response);
        assert_eq!(value["collection"]["title"], kind, "{name}");
        assert!(value["collection"]["stacktrace"].is_array());
    }
}

#[test]
fn test_collection_fields_endpoints() {
    let (_api, routes) = test_api();
    for (name, path) in [
        ("dict_fields", "/dict/fields"),
        ("list_fields", "/list/fields"),
        ("obj_fields", "/obj/fields"),
    ] {
        let response = get(&routes, name, path, COLLECTION);
        assert_eq!(response.status(), StatusCode::OK, "{name}");
        assert_eq!(response.headers()[CONTENT_TYPE], COLLECTION);
        assert_eq!(
            body(&response),
            json!({
                "collection": {
                    "href": format!("{ROOT}{}", path.trim_start_matches('/')),
                    "items": [{
                        "href": format!("{ROOT}{}", path.trim_start_matches('/')),
                        "data": [
                            {"name": "field", "value": "field"},
                            {"name": "string", "value": "string"},
                        ],
                        "links": [
                            {"href": "http://api.example.com/", "rel": "uri_field"},
                            {"href": "http://api.example.test/home_obj", "rel": "related_uri_field"},
                        ],
                    }]
                }
            }),
            "{name}"
        );
    }
}

#[test]
fn test_collection_item_href_substitutes_primary_key() {
    let mut api = Registry::new();
    api.register_serializer(
        "article",
        Schema::builder("ArticleSerializer")
            .field(Field::integer("id").primary_key())
            .field(Field::string("title").prompt("Title"))
            .field(Field::uri("website").relation("alternate"))
            .build()
            .unwrap(),
    );
    let handler = api.declare_endpoint("/articles/<int:id>", "article", |_| {
        Ok(Resource::from(json!({
            "id": 42,
            "title": "Hello",
            "website": "http://example.com",
        })))
    });

    let request = RequestContext::new(format!("{ROOT}articles/42"), ROOT).with_accept(COLLECTION);
    let value = body(&handler.call(&request));
    let item = &value["collection"]["items"][0];

    assert_eq!(item["href"], "http://api.example.test/articles/42");
    assert_eq!(item["data"].as_array().unwrap().len(), 2);
    assert_eq!(item["data"][1], json!({"name": "title", "value": "Hello", "prompt": "Title"}));
    assert_eq!(
        item["links"],
        json!([{"href": "http://example.com", "rel": "alternate"}])
    );
}

#[test]
fn test_collection_empty_result() {
    let mut api = Registry::new();
    api.register_serializer("articles", supported_fields());
    let handler = api.declare_endpoint("/articles", "articles", |_| Ok(Resource::empty()));

    let request = RequestContext::new(format!("{ROOT}articles?page=2"), ROOT).with_accept(COLLECTION);
    let value = body(&handler.call(&request));
    assert_eq!(
        value,
        json!({"collection": {"href": "http://api.example.test/articles?page=2"}})
    );
}

// ============================================================================
// Negotiation, filters and payloads
// ============================================================================

#[test]
fn test_negotiation_failure() {
    let (_api, routes) = test_api();
    let response = get(&routes, "home_dict", "/dict", "image/png");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(body(&response)["error"], "ContentNegotiationError");
}

#[test]
fn test_missing_accept_header() {
    let (_api, routes) = test_api();
    let request = RequestContext::new(format!("{ROOT}dict"), ROOT);
    let response = routes.dispatch("home_dict", &request).unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
}

fn filtered_api() -> (Registry, BoundHandler) {
    let mut api = Registry::new();
    api.register_filter_set(
        "articles",
        FilterSet::builder("ArticleFilters")
            .filter(Field::integer("author"))
            .filter(Field::boolean("published"))
            .build()
            .unwrap(),
    );
    let handler = api.declare_endpoint("/articles", "articles", |scope| {
        let filters = scope.filters().expect("filter set is registered");
        Ok(Resource::from(json!({
            "author": filters.get("author"),
            "published": filters.get("published"),
        })))
    });
    (api, handler)
}

#[test]
fn test_filter_absent_is_null() {
    let (_api, handler) = filtered_api();
    let request = RequestContext::new(format!("{ROOT}articles?author=7"), ROOT);
    let value = body(&handler.call(&request));
    assert_eq!(value, json!({"items": [{"author": 7, "published": null}]}));
}

#[test]
fn test_filter_validation_failure_skips_handler() {
    let mut api = Registry::new();
    api.register_filter_set(
        "articles",
        FilterSet::builder("ArticleFilters")
            .filter(Field::integer("author"))
            .build()
            .unwrap(),
    );
    let handler = api.declare_endpoint("/articles", "articles", |_| {
        panic!("handler must not run when filters are invalid")
    });

    let request =
        RequestContext::new(format!("{ROOT}articles?author=bob"), ROOT).with_accept(COLLECTION);
    let response = handler.call(&request);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let value = body(&response);
    assert_eq!(value["collection"]["title"], "FilterValidationError");
    assert_eq!(
        value["collection"]["stacktrace"],
        json!(["validate filter set `ArticleFilters`"])
    );
}

#[test]
fn test_payload_reaches_handler() {
    let mut api = Registry::new();
    api.register_deserializer(
        "create",
        Deserializer::new(
            Schema::builder("ArticleInput")
                .field(Field::string("title"))
                .field(Field::integer("author"))
                .build()
                .unwrap(),
        ),
    );
    let handler = api.declare_endpoint("/articles", "create", |scope| {
        let payload = scope.payload().cloned().unwrap_or_default();
        Ok(Resource::from(payload))
    });

    let request = RequestContext::new(format!("{ROOT}articles"), ROOT)
        .with_body(r#"{"title": "Draft", "author": "3", "ignored": true}"#);
    let value = body(&handler.call(&request));
    assert_eq!(value, json!({"items": [{"title": "Draft", "author": 3}]}));
}

// ============================================================================
// Status policy and configuration
// ============================================================================

#[test]
fn test_classified_status_policy() {
    let config = RegistryConfig {
        status_policy: StatusPolicy::Classified,
        ..Default::default()
    };
    let mut api = Registry::with_config(&config).unwrap();
    api.register_filter_set(
        "articles",
        FilterSet::builder("ArticleFilters")
            .filter(Field::integer("author"))
            .build()
            .unwrap(),
    );
    let handler = api.declare_endpoint("/articles", "articles", |_| Ok(Resource::empty()));

    let bad_filter = RequestContext::new(format!("{ROOT}articles?author=x"), ROOT);
    assert_eq!(handler.call(&bad_filter).status(), StatusCode::BAD_REQUEST);

    let unacceptable = RequestContext::new(format!("{ROOT}articles"), ROOT).with_accept("image/png");
    assert_eq!(
        handler.call(&unacceptable).status(),
        StatusCode::NOT_ACCEPTABLE
    );
}

#[test]
fn test_global_content_type_override() {
    let mut config = RegistryConfig::default();
    config.content_types.insert(
        "text/html".to_string(),
        restform::BuiltinContentType::CollectionJson,
    );
    let mut api = Registry::with_config(&config).unwrap();
    api.register_serializer("dict_fields", supported_fields());
    let handler = api.declare_endpoint("/dict/fields", "dict_fields", |_| {
        Ok(Resource::from(json!({"field": "f", "string": "s", "uri_field": "u"})))
    });

    let request = RequestContext::new(format!("{ROOT}dict/fields"), ROOT).with_accept("text/html");
    let response = handler.call(&request);
    assert_eq!(response.headers()[CONTENT_TYPE], COLLECTION);
    assert!(body(&response)["collection"]["items"].is_array());
}

#[test]
fn test_error_rendering_defaults() {
    let errors = ErrorRendering::default();
    assert_eq!(errors.status_policy(), StatusPolicy::Uniform);
    assert_eq!(errors.fallback().media_type(), "application/json");
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_requests_do_not_share_state() {
    let (_api, handler) = filtered_api();
    let threads: Vec<_> = (0..8)
        .map(|author| {
            let handler = handler.clone();
            std::thread::spawn(move || {
                let request = RequestContext::new(format!("{ROOT}articles?author={author}"), ROOT);
                (author, body(&handler.call(&request)))
            })
        })
        .collect();

    for thread in threads {
        let (author, value) = thread.join().unwrap();
        assert_eq!(value["items"][0]["author"], json!(author));
    }
}

#[test]
fn test_rendering_is_repeatable() {
    let (_api, routes) = test_api();
    let first = get(&routes, "obj_fields", "/obj/fields", COLLECTION);
    let second = get(&routes, "obj_fields", "/obj/fields", COLLECTION);
    assert_eq!(first.body(), second.body());
}

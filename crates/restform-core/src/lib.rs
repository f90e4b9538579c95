//! Core runtime for restform.
//!
//! A request flows through an [`Endpoint`]: the `Accept` header picks a
//! [`ContentType`], the endpoint's [`FilterSet`] validates the query string,
//! the handler returns a [`Resource`], and each item is bound to the
//! endpoint's serializer [`Schema`] and rendered. Any failure on the way is
//! rendered as an error envelope instead.
//!
//! Most applications use the `restform` facade crate, which re-exports this
//! crate and adds `#[derive(Record)]` and an axum adapter.

pub mod config;
pub mod content_type;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod field;
pub mod filter;
pub mod negotiate;
pub mod path;
pub mod registry;
pub mod resource;
pub mod schema;

pub use config::{BuiltinContentType, ConfigError, RegistryConfig, StatusPolicy};
pub use content_type::{
    CollectionJson, ContentType, ContentTypeMap, Json, Render, Response, json_response,
};
pub use context::RequestContext;
pub use endpoint::{
    Endpoint, ErrorRendering, HandlerFn, HandlerResult, RequestScope, SetupError,
};
pub use error::{
    BoxError, ErrorCode, ErrorKind, Failure, PipelineError, ResultExt, SchemaError,
};
pub use field::{CoercionError, Field, FieldKind, LinkParam, RawValue};
pub use filter::{Filter, FilterSet, FilterSetBuilder, ValidatedFilters};
pub use negotiate::{AcceptPreferences, MediaRange};
pub use path::PathTemplate;
pub use registry::{BoundHandler, Component, Registry, RegistryError, Route, RouteTable, Router};
pub use resource::{AttributeError, Record, Resource};
pub use schema::{BoundField, BoundSerializer, Deserializer, Schema, SchemaBuilder};

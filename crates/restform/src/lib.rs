//! Restform - declarative REST endpoints with content negotiation
//!
//! Declare an endpoint with a handler, attach a serializer schema, an optional
//! filter set and deserializer, and restform negotiates the representation
//! from the `Accept` header, validates the query string, and renders whatever
//! the handler returns as plain JSON or Collection+JSON.
//!
//! # Quick Start
//!
//! ```ignore
//! use restform::prelude::*;
//!
//! #[derive(serde::Serialize, Record)]
//! struct Article {
//!     id: u64,
//!     title: String,
//! }
//!
//! let routes = RouteTable::new();
//! let mut registry = Registry::new();
//! registry.init_router(routes.clone())?;
//!
//! registry.register_serializer(
//!     "article",
//!     Schema::builder("ArticleSerializer")
//!         .field(Field::integer("id").primary_key())
//!         .field(Field::string("title"))
//!         .field(Field::related_uri("comments", "/comments").field_param("article", "id"))
//!         .build()?,
//! );
//! registry.declare_endpoint("/articles/{id}", "article", |_scope| {
//!     Ok(Resource::record(Article { id: 1, title: "Hello".into() }))
//! });
//!
//! let app = restform::axum::router(&routes);
//! ```
//!
//! # Content Types
//!
//! | Media type | Rendered as |
//! |------------|-------------|
//! | `text/html` | JSON `{"items": [...]}` |
//! | `application/json` | JSON `{"items": [...]}` |
//! | `application/vnd.collection+json` | Collection+JSON with `data` and `links` |
//!
//! Global overrides come from [`RegistryConfig`]; per-endpoint overrides from
//! [`Registry::register_content_type`].
//!
//! # Configuration
//!
//! With the `config` feature a registry can be configured from TOML:
//!
//! ```toml
//! fallback_content_type = "application/json"
//! status_policy = "classified"
//!
//! [content_types]
//! "application/hal+json" = "json"
//! ```
//!
//! # Feature Flags
//!
//! - `axum` - mount a [`RouteTable`] on an `axum::Router`
//! - `config` - load [`RegistryConfig`] from TOML
//! - `full` - All features (default)

#[cfg(feature = "axum")]
pub mod axum;

// Record derive and trait share a name, like serde's Serialize
pub use restform_core::Record;
pub use restform_macros::Record;

// Re-export core types
pub use restform_core::*;

// Re-export serde for generated code
pub use serde;
pub use serde_json;

pub mod prelude {
    pub use crate::Record;
    pub use restform_core::{
        CollectionJson, ContentType, Deserializer, Field, FilterSet, HandlerResult, Json,
        Registry, RegistryConfig, RequestContext, RequestScope, Resource, RouteTable, Schema,
        StatusPolicy,
    };
}

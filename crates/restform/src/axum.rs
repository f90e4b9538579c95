//! Serve a [`RouteTable`] with axum.
//!
//! ```ignore
//! let routes = RouteTable::new();
//! registry.init_router(routes.clone())?;
//! // declare endpoints ...
//!
//! let app = restform::axum::router(&routes);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! The axum router is a snapshot: endpoints declared after [`router`] is
//! called are not served by it.

use std::collections::HashSet;

use ::axum::body::{Body, to_bytes};
use ::axum::extract::Request;
use ::axum::http::StatusCode;
use ::axum::response::{IntoResponse, Response};
use ::axum::routing::any;
use tracing::{info, warn};

use restform_core::{BoundHandler, RequestContext, RouteTable};

/// Largest request body read before the handler runs.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Build an axum router serving every route in `routes`.
///
/// Each route answers every method; endpoints decide for themselves what a
/// method means. When two endpoints share a path the first one wins.
pub fn router(routes: &RouteTable) -> ::axum::Router {
    let mut router = ::axum::Router::new();
    let mut mounted = HashSet::new();
    for route in routes.routes() {
        let pattern = route.path.route_pattern();
        if !mounted.insert(pattern.clone()) {
            warn!(name = %route.name, path = %pattern, "path already mounted, skipping");
            continue;
        }
        info!(name = %route.name, path = %pattern, "mounting endpoint");
        let handler = route.handler;
        router = router.route(
            &pattern,
            any(move |request: Request| {
                let handler = handler.clone();
                async move { serve(handler, request).await }
            }),
        );
    }
    router
}

async fn serve(handler: BoundHandler, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, BODY_LIMIT).await {
        Ok(body) => body,
        Err(err) => {
            warn!(name = handler.name(), error = %err, "failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let request = RequestContext::from_parts(&parts).with_body(body);
    handler.call(&request).map(Body::from)
}

//! Request context handed to the pipeline by the hosting server.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{ACCEPT, HOST};
use indexmap::IndexMap;

use crate::negotiate::AcceptPreferences;

/// Everything the pipeline needs to know about an incoming request.
///
/// The hosting server builds one per request, either by hand or from
/// [`http::request::Parts`] via [`RequestContext::from_parts`]:
///
/// ```
/// use restform_core::RequestContext;
///
/// let ctx = RequestContext::new("http://api.example.com/articles?author=7", "http://api.example.com/")
///     .with_header("Accept", "application/vnd.collection+json");
///
/// assert_eq!(ctx.query("author"), Some("7"));
/// assert_eq!(ctx.url_root(), "http://api.example.com/");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Full originating URL, query string included
    url: String,
    /// Scheme, host and base path, always ending with `/`
    url_root: String,
    accept: AcceptPreferences,
    /// Query parameters in request order; the first occurrence of a key wins
    query: IndexMap<String, String>,
    /// Header names are stored lowercased
    headers: HashMap<String, String>,
    body: Option<Bytes>,
}

impl RequestContext {
    /// Create a context for `url`, parsing its query string.
    pub fn new(url: impl Into<String>, url_root: impl Into<String>) -> Self {
        let url = url.into();
        let query = url
            .split_once('?')
            .map(|(_, query)| parse_query(query))
            .unwrap_or_default();
        Self {
            url,
            url_root: normalize_root(url_root.into()),
            query,
            ..Default::default()
        }
    }

    /// Build a context from `http` request parts, inferring the URL root from
    /// the request target, `X-Forwarded-Proto` and `Host`.
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        let scheme = parts
            .uri
            .scheme_str()
            .or_else(|| header_str(parts, "x-forwarded-proto"))
            .unwrap_or("http");
        let host = parts
            .uri
            .authority()
            .map(|authority| authority.as_str())
            .or_else(|| header_str(parts, HOST.as_str()))
            .unwrap_or("localhost");
        Self::from_parts_with_root(parts, format!("{scheme}://{host}/"))
    }

    /// Build a context from `http` request parts with a known URL root.
    pub fn from_parts_with_root(parts: &http::request::Parts, url_root: impl Into<String>) -> Self {
        let url_root = normalize_root(url_root.into());
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!(
            "{}{}",
            url_root.trim_end_matches('/'),
            if path_and_query.starts_with('/') {
                path_and_query.to_string()
            } else {
                format!("/{path_and_query}")
            }
        );

        let mut ctx = Self::new(url, url_root);
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                ctx.append_header(name.as_str(), value);
            }
        }
        ctx
    }

    /// Set a header. Setting `Accept` also updates the parsed preferences.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        if name == ACCEPT.as_str() {
            self.accept = AcceptPreferences::parse(&value);
        }
        self.headers.insert(name, value);
        self
    }

    /// Shorthand for `with_header("Accept", ...)`.
    pub fn with_accept(self, accept: impl Into<String>) -> Self {
        self.with_header(ACCEPT.as_str(), accept)
    }

    /// Add a query parameter unless the key is already present.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Repeated headers are joined with `, ` as HTTP allows for list-valued headers.
    fn append_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let joined = match self.headers.get(&name) {
            Some(existing) => format!("{existing}, {value}"),
            None => value.to_string(),
        };
        if name == ACCEPT.as_str() {
            self.accept = AcceptPreferences::parse(&joined);
        }
        self.headers.insert(name, joined);
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn url_root(&self) -> &str {
        &self.url_root
    }

    pub fn accept(&self) -> &AcceptPreferences {
        &self.accept
    }

    /// Get a query parameter
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|s| s.as_str())
    }

    pub fn query_params(&self) -> &IndexMap<String, String> {
        &self.query
    }

    /// Get a header value (case-insensitive lookup)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Get the request body, if one was supplied and is non-empty
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref().filter(|body| !body.is_empty())
    }
}

fn header_str<'a>(parts: &'a http::request::Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn normalize_root(mut root: String) -> String {
    if !root.ends_with('/') {
        root.push('/');
    }
    root
}

fn parse_query(query: &str) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

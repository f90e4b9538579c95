//! Endpoint path templates with placeholder segments.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped when a value is substituted into a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A route path such as `/articles/{id}` or `/articles/<int:id>`.
///
/// Both placeholder syntaxes are accepted; [`PathTemplate::route_pattern`]
/// normalizes to the `{name}` form routers expect.
///
/// ```
/// use restform_core::PathTemplate;
///
/// let path = PathTemplate::parse("/articles/<int:id>/comments");
/// assert_eq!(path.placeholders().collect::<Vec<_>>(), vec!["id"]);
/// assert_eq!(path.route_pattern(), "/articles/{id}/comments");
/// assert_eq!(path.expand("7"), "articles/7/comments");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template. An unterminated placeholder is kept as literal text.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw.as_str();

        while let Some(open) = rest.find(['{', '<']) {
            let close_char = if rest.as_bytes()[open] == b'{' { '}' } else { '>' };
            let Some(len) = rest[open + 1..].find(close_char) else {
                break;
            };
            literal.push_str(&rest[..open]);
            let inner = &rest[open + 1..open + 1 + len];
            // `<int:id>` carries a converter prefix.
            let name = inner.rsplit(':').next().unwrap_or(inner).trim();
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name.to_string()));
            rest = &rest[open + len + 2..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// The template with every placeholder written as `{name}`.
    pub fn route_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(text),
                Segment::Placeholder(name) => {
                    pattern.push('{');
                    pattern.push_str(name);
                    pattern.push('}');
                }
            }
        }
        if !pattern.starts_with('/') {
            pattern.insert(0, '/');
        }
        pattern
    }

    /// Substitute `value` for every placeholder. The result is relative to the
    /// URL root, so leading slashes are dropped.
    pub fn expand(&self, value: &str) -> String {
        let encoded = utf8_percent_encode(value, SEGMENT).to_string();
        let mut path = String::with_capacity(self.raw.len() + encoded.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(_) => path.push_str(&encoded),
            }
        }
        path.trim_start_matches('/').to_string()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for PathTemplate {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for PathTemplate {
    fn from(raw: String) -> Self {
        Self::parse(raw)
    }
}

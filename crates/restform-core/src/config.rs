//! Registry configuration.
//!
//! Built programmatically or, with the `config` feature, loaded from TOML:
//!
//! ```toml
//! fallback_content_type = "application/json"
//! status_policy = "classified"
//!
//! [content_types]
//! "text/html" = "collection+json"
//! ```

use std::sync::Arc;

use http::StatusCode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content_type::{CollectionJson, ContentType, ContentTypeMap, Json};
use crate::endpoint::ErrorRendering;
use crate::error::ErrorKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "config")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("`{0}` is not a valid media type")]
    InvalidMediaType(String),

    #[error("fallback content type `{0}` is not in the default content type map")]
    UnknownFallback(String),
}

/// How failures map to response status codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Every failure is a 500.
    #[default]
    Uniform,
    /// Client mistakes are 4xx, everything else 500.
    Classified,
}

impl StatusPolicy {
    pub fn status_for(&self, kind: ErrorKind) -> StatusCode {
        match self {
            StatusPolicy::Uniform => StatusCode::INTERNAL_SERVER_ERROR,
            StatusPolicy::Classified => kind.error_code().http_status(),
        }
    }
}

/// Content types that can be named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinContentType {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "collection+json")]
    CollectionJson,
}

impl BuiltinContentType {
    pub fn content_type(&self) -> Arc<dyn ContentType> {
        match self {
            BuiltinContentType::Json => Arc::new(Json),
            BuiltinContentType::CollectionJson => Arc::new(CollectionJson),
        }
    }
}

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Content type used to render failures that happen before negotiation.
    #[serde(default = "default_fallback")]
    pub fallback_content_type: String,

    #[serde(default)]
    pub status_policy: StatusPolicy,

    /// Global overrides layered on the built-in content type map.
    #[serde(default)]
    pub content_types: IndexMap<String, BuiltinContentType>,
}

fn default_fallback() -> String {
    Json::MEDIA_TYPE.to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fallback_content_type: default_fallback(),
            status_policy: StatusPolicy::default(),
            content_types: IndexMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Parse and validate TOML configuration.
    #[cfg(feature = "config")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    #[cfg(feature = "config")]
    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let defaults = self.default_content_types()?;
        if defaults.get(&self.fallback_content_type).is_none() {
            return Err(ConfigError::UnknownFallback(
                self.fallback_content_type.clone(),
            ));
        }
        Ok(())
    }

    /// Built-in content types with the global overrides applied.
    pub fn default_content_types(&self) -> Result<ContentTypeMap, ConfigError> {
        let mut map = ContentTypeMap::builtin();
        for (media_type, builtin) in &self.content_types {
            if media_type.parse::<mime::Mime>().is_err() {
                return Err(ConfigError::InvalidMediaType(media_type.clone()));
            }
            map.insert_as(media_type.clone(), builtin.content_type());
        }
        Ok(map)
    }

    /// How failures are rendered: the status policy and the fallback content
    /// type looked up in `defaults`.
    pub fn error_rendering(&self, defaults: &ContentTypeMap) -> Result<ErrorRendering, ConfigError> {
        let fallback = defaults
            .get(&self.fallback_content_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFallback(self.fallback_content_type.clone()))?;
        Ok(ErrorRendering::new(self.status_policy, fallback))
    }
}

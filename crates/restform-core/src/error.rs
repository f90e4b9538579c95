//! Pipeline failures and their mapping onto response status codes.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Boxed error returned by endpoint handlers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Protocol-agnostic error code that maps to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 400 Bad Request
    InvalidInput,
    /// 406 Not Acceptable
    NotAcceptable,
    /// 500 Internal Server Error
    Internal,
}

impl ErrorCode {
    /// Convert to HTTP status code
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Stable identifier for every failure the request pipeline can produce.
///
/// Error envelopes carry [`ErrorKind::as_str`] as their error/title identifier,
/// so these strings are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingField,
    NoPrimaryKey,
    ContentNegotiation,
    FilterValidation,
    UnserializableResult,
    InvalidPayload,
    Handler,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingField => "MissingFieldError",
            ErrorKind::NoPrimaryKey => "NoPrimaryKeyError",
            ErrorKind::ContentNegotiation => "ContentNegotiationError",
            ErrorKind::FilterValidation => "FilterValidationError",
            ErrorKind::UnserializableResult => "UnserializableResultError",
            ErrorKind::InvalidPayload => "InvalidPayloadError",
            ErrorKind::Handler => "HandlerError",
        }
    }

    /// Classify this kind as a client or server failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ErrorKind::MissingField | ErrorKind::FilterValidation | ErrorKind::InvalidPayload => {
                ErrorCode::InvalidInput
            }
            ErrorKind::ContentNegotiation => ErrorCode::NotAcceptable,
            ErrorKind::NoPrimaryKey | ErrorKind::UnserializableResult | ErrorKind::Handler => {
                ErrorCode::Internal
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can go wrong between request setup and response rendering.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A strict field found neither a key nor an attribute to read.
    #[error("field `{field}` requires `{key}`, which the source object does not provide")]
    MissingField { field: String, key: String },

    /// Collection+JSON rendering needs a primary key to build item links.
    #[error("serializer `{schema}` declares no primary key field")]
    NoPrimaryKey { schema: String },

    #[error("none of the offered content types ({offered}) is acceptable for `Accept: {accept}`")]
    ContentNegotiation { accept: String, offered: String },

    #[error("filter `{filter}` rejected `{value}`: {reason}")]
    FilterValidation {
        filter: String,
        value: String,
        reason: String,
    },

    #[error("cannot serialize {shape}: {reason}")]
    UnserializableResult { shape: String, reason: String },

    #[error("invalid request payload: {reason}")]
    InvalidPayload { reason: String },

    /// The handler itself failed.
    #[error("{0}")]
    Handler(#[source] BoxError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingField { .. } => ErrorKind::MissingField,
            PipelineError::NoPrimaryKey { .. } => ErrorKind::NoPrimaryKey,
            PipelineError::ContentNegotiation { .. } => ErrorKind::ContentNegotiation,
            PipelineError::FilterValidation { .. } => ErrorKind::FilterValidation,
            PipelineError::UnserializableResult { .. } => ErrorKind::UnserializableResult,
            PipelineError::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            PipelineError::Handler(_) => ErrorKind::Handler,
        }
    }

    /// Wrap a handler error, keeping the kind of a `PipelineError` the handler passed through.
    pub fn from_handler(error: BoxError) -> Self {
        match error.downcast::<PipelineError>() {
            Ok(pipeline) => *pipeline,
            Err(other) => PipelineError::Handler(other),
        }
    }

    pub(crate) fn unserializable(shape: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::UnserializableResult {
            shape: shape.into(),
            reason: reason.into(),
        }
    }
}

/// A [`PipelineError`] together with the pipeline stages it crossed.
///
/// Frames are stored outermost first: the stage closest to the request boundary
/// comes before the stage where the error was raised.
#[derive(Debug)]
pub struct Failure {
    error: PipelineError,
    frames: Vec<String>,
}

impl Failure {
    pub fn new(error: PipelineError) -> Self {
        Self {
            error,
            frames: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn error(&self) -> &PipelineError {
        &self.error
    }

    pub fn into_error(self) -> PipelineError {
        self.error
    }

    /// Human readable description of the failure.
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Diagnostic trace: stage frames, outermost first, then the error's cause chain.
    pub fn stacktrace(&self) -> Vec<String> {
        let message = self.message();
        let causes = std::iter::successors(self.error.source(), |&e| e.source())
            .map(|cause| cause.to_string())
            .filter(|cause| *cause != message)
            .map(|cause| format!("caused by: {cause}"));
        self.frames.iter().cloned().chain(causes).collect()
    }

    /// Record an enclosing stage. Called while unwinding, so it prepends.
    pub fn within(mut self, frame: impl Into<String>) -> Self {
        self.frames.insert(0, frame.into());
        self
    }
}

impl From<PipelineError> for Failure {
    fn from(error: PipelineError) -> Self {
        Failure::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.error)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// Attach pipeline stage frames to a failing result.
pub trait ResultExt<T> {
    fn frame<F, S>(self, frame: F) -> Result<T, Failure>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Failure>,
{
    fn frame<F, S>(self, frame: F) -> Result<T, Failure>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|error| error.into().within(frame()))
    }
}

/// Declaration-time problems with a serializer, deserializer or filter set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("`{schema}` declares field `{field}` more than once")]
    DuplicateField { schema: String, field: String },

    #[error("field `{field}` in `{schema}` refers to undeclared field `{target}`")]
    UnknownReference {
        schema: String,
        field: String,
        target: String,
    },

    #[error("field `{field}` in `{schema}` is part of a reference cycle")]
    CyclicReference { schema: String, field: String },

    #[error("field `{field}` in `{schema}` cannot read query parameters")]
    UnsupportedFilter { schema: String, field: String },

    #[error("field `{field}` in `{schema}` is not a link but sets `{option}`")]
    InapplicableOption {
        schema: String,
        field: String,
        option: &'static str,
    },
}

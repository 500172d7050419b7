use crate::document_key::DocumentKey;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Result type for rank evaluation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rank evaluation operations
#[derive(Error, Debug)]
pub enum Error {
    /// Batch input that is not a valid JSON array of rated requests
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duplicate or non-monotonic rank positions in a returned hit list
    #[error("Invalid hit sequence: {0}")]
    InvalidHitSequence(String),

    /// The same document was returned more than once for one query
    #[error("Invalid hit sequence: document {0} returned more than once")]
    DuplicateHit(DocumentKey),

    /// The same document was rated more than once for one query
    #[error("Document {0} rated more than once")]
    DuplicateRating(DocumentKey),

    /// A serialized metric breakdown carries a tag with no registered decoder
    #[error("Unknown metric details variant '{tag}'")]
    UnknownMetricVariant { tag: String },

    /// Two metric breakdown decoders were registered under one tag
    #[error("Metric details variant '{tag}' is already registered")]
    DuplicateVariantTag { tag: String },

    /// Malformed or truncated binary encoding
    #[error("Wire format error: {0}")]
    Wire(String),

    /// No query in a batch evaluated successfully
    #[error("No query in the batch evaluated successfully")]
    EmptyBatchResult,

    /// Evaluation was cancelled before the query started
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Failure while evaluating a single query of a batch
    #[error("Evaluation of query '{query_id}' failed: {source}")]
    QueryEvaluation {
        query_id: String,
        #[source]
        source: Box<Error>,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable classification of an [`Error`], recorded in per-query failure records
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidHitSequence,
    InvalidRatings,
    UnknownMetricVariant,
    Wire,
    EmptyBatchResult,
    Cancelled,
    QueryEvaluation,
    InvalidInput,
    Config,
    Json,
    Other,
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid hit sequence error
    pub fn invalid_hit_sequence(msg: impl Into<String>) -> Self {
        Self::InvalidHitSequence(msg.into())
    }

    /// Creates an unknown metric variant error
    pub fn unknown_metric_variant(tag: impl Into<String>) -> Self {
        Self::UnknownMetricVariant { tag: tag.into() }
    }

    /// Creates a wire format error
    pub fn wire(msg: impl Into<String>) -> Self {
        Self::Wire(msg.into())
    }

    /// Creates a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wraps an error raised while evaluating one query of a batch
    pub fn query_evaluation(query_id: impl Into<String>, source: Error) -> Self {
        Self::QueryEvaluation {
            query_id: query_id.into(),
            source: Box::new(source),
        }
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Classifies this error. Query evaluation wrappers report the kind of
    /// the underlying failure unless it is unclassified.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHitSequence(_) | Self::DuplicateHit(_) => ErrorKind::InvalidHitSequence,
            Self::DuplicateRating(_) => ErrorKind::InvalidRatings,
            Self::UnknownMetricVariant { .. } => ErrorKind::UnknownMetricVariant,
            Self::DuplicateVariantTag { .. } => ErrorKind::Config,
            Self::Wire(_) => ErrorKind::Wire,
            Self::EmptyBatchResult => ErrorKind::EmptyBatchResult,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::QueryEvaluation { source, .. } => match source.kind() {
                ErrorKind::Other => ErrorKind::QueryEvaluation,
                kind => kind,
            },
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Config(_) => ErrorKind::Config,
            Self::Json(_) => ErrorKind::Json,
            Self::WithContext { .. } | Self::Other(_) => ErrorKind::Other,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}

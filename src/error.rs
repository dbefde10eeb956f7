use std::sync::Arc;

/// Result type used throughout the crate, with [`Error`] as the error variant.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the decision engine and its ODP collaborators.
///
/// Matcher-level failures (missing attribute, attribute type mismatch,
/// unsupported condition value) are deliberately *not* represented here: they
/// are recovered locally during condition-tree evaluation and folded into
/// tri-state logic, so they never propagate out of a decision.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Datafile declares a schema version this engine does not support.
    #[error("unsupported datafile version: {0:?}")]
    UnsupportedDatafileVersion(String),

    /// Datafile is not valid JSON or does not match the expected shape.
    #[error("failed to parse datafile")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    InvalidDatafile(#[source] Arc<serde_json::Error>),

    /// An integration entry in the datafile is missing its `key` field.
    #[error("datafile integration entry is missing the \"key\" field")]
    InvalidIntegration,

    /// A lookup into the project config failed to resolve.
    #[error("{kind} {key:?} not found in the project config")]
    NotFound {
        /// Kind of entity looked up ("flag", "experiment", ...).
        kind: &'static str,
        /// The key or id that failed to resolve.
        key: String,
    },

    /// A version string does not conform to the comparator's format.
    #[error("invalid version format: {0:?}")]
    InvalidVersionFormat(String),

    /// The configured ODP host is not a valid URL.
    #[error("invalid api_host configuration")]
    InvalidApiHost(#[source] url::ParseError),

    /// The segments endpoint rejected the user identifier.
    #[error("fetching qualified segments failed: invalid segment identifier")]
    InvalidSegmentIdentifier,

    /// The segments endpoint returned a GraphQL error.
    #[error("fetching qualified segments failed: {0}")]
    FetchSegmentsFailed(String),

    /// ODP operations require a non-empty API key and host.
    #[error("odp is not integrated")]
    OdpNotIntegrated,

    /// ODP events must carry a non-empty action.
    #[error("odp event action is empty")]
    OdpInvalidAction,

    /// ODP event data values must be primitive or null.
    #[error("odp event data contains non-primitive values")]
    OdpInvalidData,

    /// The ODP event queue is at capacity.
    #[error("odp event queue is full")]
    QueueFull,

    /// Dispatching a batch of ODP events failed.
    #[error("odp event dispatch failed: {reason}")]
    OdpEventFailed {
        /// Human-readable failure reason.
        reason: String,
        /// Whether the same batch may be retried.
        retryable: bool,
    },

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidDatafile(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

//! Error types for listing operations.

use thiserror::Error;

/// Fatal errors. Anything that is not fatal is recorded as a
/// [`ListError`](crate::resource::ListError) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing scope or credential, bad parallelism, unknown extension type
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed schema snapshot entry
    #[error("malformed schema: {0}")]
    Schema(String),

    /// A resource id that does not follow the ARM id grammar
    #[error("invalid resource id {id:?}: {reason}")]
    InvalidResourceId { id: String, reason: String },

    /// The seed query failed or returned an untrustworthy result
    #[error("seed query {query:?}: {message}")]
    SeedQuery { query: String, message: String },

    /// An adapter call outside the per-endpoint listing failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A pool task panicked or was aborted
    #[error("task failed: {0}")]
    Task(String),

    /// The ambient cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

/// Errors raised by the network adapters.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success HTTP status
    #[error("{method} {url}: status {status}: {message}")]
    Status {
        method: &'static str,
        status: u16,
        url: String,
        message: String,
    },

    #[error("sending request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decoding response: {0}")]
    Decode(String),

    #[error("acquiring token: {0}")]
    Auth(String),
}

impl ApiError {
    /// Whether this is a 404, which listing treats as "no children".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Client error type.

use gapic_core::{Code, EnvelopeError, PathError, Status};

use crate::config::ConfigError;

/// Errors returned by client operations.
///
/// A remote failure always surfaces as [`ClientError::Status`] carrying the
/// server's code and message untouched; the other variants describe failures
/// that happened on this side of the wire.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The remote side reported a terminal status.
    #[error("{0}")]
    Status(Status),

    /// The request never completed at the transport level.
    #[error("transport error: {0}")]
    Transport(String),

    /// The client or call configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource name could not be rendered or parsed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The stream was cancelled or closed before this read.
    #[error("stream closed")]
    StreamClosed,

    /// The request message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Create a status error with a code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        ClientError::Status(Status::new(code, message))
    }

    /// Create a status error from a code alone.
    pub fn from_code(code: Code) -> Self {
        ClientError::Status(Status::from_code(code))
    }

    /// Get the canonical code for this error.
    ///
    /// Local failures map onto the canonical code space so that policy
    /// decisions (retry gating, observability) can treat every error
    /// uniformly:
    /// - [`Transport`](Self::Transport) maps to `Unavailable`
    /// - [`Config`](Self::Config) and [`Path`](Self::Path) map to `InvalidArgument`
    /// - [`StreamClosed`](Self::StreamClosed) maps to `Canceled`
    /// - [`Encode`](Self::Encode) and [`Decode`](Self::Decode) map to `Internal`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Config(_) => Code::InvalidArgument,
            ClientError::Path(_) => Code::InvalidArgument,
            ClientError::StreamClosed => Code::Canceled,
            ClientError::Encode(_) => Code::Internal,
            ClientError::Decode(_) => Code::Internal,
        }
    }

    /// Get the remote status, if this error carries one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Check if this error carries a default-transient code.
    ///
    /// The effective retryable set for a call comes from its retry policy;
    /// this helper answers for the default set only.
    ///
    /// # Example
    ///
    /// ```
    /// use gapic_client::ClientError;
    ///
    /// let err = ClientError::Transport("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = ClientError::unauthenticated("bad token");
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Create a `Canceled` status error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an `InvalidArgument` status error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a `DeadlineExceeded` status error.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a `NotFound` status error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a `ResourceExhausted` status error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create an `Internal` status error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an `Unavailable` status error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create an `Unauthenticated` status error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Status(status)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::IncompleteHeader { .. } | EnvelopeError::InvalidFlags(_) => {
                ClientError::Decode(err.to_string())
            }
            EnvelopeError::Oversize { .. } => ClientError::resource_exhausted(err.to_string()),
        }
    }
}

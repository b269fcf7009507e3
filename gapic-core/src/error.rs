//! Canonical status codes and the wire-level status type.
//!
//! Every RPC terminates with a [`Code`]. Remote failures additionally carry a
//! [`Status`] with the code and the server's message, which the runtime
//! surfaces to callers verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical RPC status codes.
///
/// The numeric values match the canonical code space used by cloud APIs, so
/// they can be compared against status protos and documentation directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The operation completed successfully.
    Ok = 0,
    /// The operation was cancelled, typically by the caller.
    Canceled = 1,
    /// Unknown error, e.g. a status from an unrecognized error space.
    Unknown = 2,
    /// The client specified an invalid argument.
    InvalidArgument = 3,
    /// The deadline expired before the operation could complete.
    DeadlineExceeded = 4,
    /// Some requested entity was not found.
    NotFound = 5,
    /// The entity that a client attempted to create already exists.
    AlreadyExists = 6,
    /// The caller does not have permission to execute the operation.
    PermissionDenied = 7,
    /// Some resource has been exhausted, e.g. a quota or a message-size limit.
    ResourceExhausted = 8,
    /// The system is not in a state required for the operation's execution.
    FailedPrecondition = 9,
    /// The operation was aborted, typically due to a concurrency conflict.
    Aborted = 10,
    /// The operation was attempted past the valid range.
    OutOfRange = 11,
    /// The operation is not implemented or supported by the service.
    Unimplemented = 12,
    /// Internal error: an invariant expected by the service was broken.
    Internal = 13,
    /// The service is currently unavailable; this is usually transient.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// The request does not have valid authentication credentials.
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Check if this code is considered transient by default.
    ///
    /// This is the retryable set a retry policy starts from when the caller
    /// does not configure an explicit one: the call may well succeed if tried
    /// again. Policies can widen or narrow the set per method.
    ///
    /// # Example
    ///
    /// ```
    /// use gapic_core::Code;
    ///
    /// assert!(Code::Unavailable.is_retryable());
    /// assert!(Code::DeadlineExceeded.is_retryable());
    /// assert!(!Code::NotFound.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Code::DeadlineExceeded | Code::Unavailable)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status code string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCodeError(pub(crate) ());

impl fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown status code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            "unauthenticated" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// Errors produced while framing or deframing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The buffer ended before a complete envelope header was read.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader {
        /// Expected header size in bytes.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// The envelope flags byte is not a recognized value.
    #[error("invalid envelope flags: {0:#04x}")]
    InvalidFlags(u8),

    /// The envelope payload exceeds the configured receive limit.
    #[error("envelope of {actual} bytes exceeds the {limit} byte receive limit")]
    Oversize {
        /// Declared payload size in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
}

/// A terminal RPC status as reported by the remote side.
///
/// The code and message are carried through the runtime untouched, so callers
/// always see exactly what the server sent.
///
/// # Example
///
/// ```
/// use gapic_core::{Code, Status};
///
/// let status = Status::not_found("no such instance");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), Some("no such instance"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The canonical status code.
    code: Code,
    /// Human-readable description from the server, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a status from a code alone.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the status message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Check if this status carries a default-transient code.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Create a `Canceled` status.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an `Unknown` status.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Create an `InvalidArgument` status.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a `DeadlineExceeded` status.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a `NotFound` status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create an `AlreadyExists` status.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    /// Create a `PermissionDenied` status.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    /// Create a `ResourceExhausted` status.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create a `FailedPrecondition` status.
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an `Aborted` status.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }

    /// Create an `OutOfRange` status.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(Code::OutOfRange, message)
    }

    /// Create an `Unimplemented` status.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an `Internal` status.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an `Unavailable` status.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create a `DataLoss` status.
    pub fn data_loss(message: impl Into<String>) -> Self {
        Self::new(Code::DataLoss, message)
    }

    /// Create an `Unauthenticated` status.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.code, msg),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for Status {}

//! Terminal error response parsing.
//!
//! Parses JSON error bodies from failed calls into [`ClientError`].

use gapic_core::Code;
use serde::Deserialize;

use crate::ClientError;

/// JSON structure of an error response body.
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "resource not found"
///   }
/// }
/// ```
#[derive(Deserialize)]
struct ErrorBodyJson {
    error: ErrorJson,
}

#[derive(Deserialize)]
struct ErrorJson {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// Parse the body of a non-success response.
///
/// The code and message from the body pass through untouched. If the body
/// cannot be parsed, the error code is derived from the HTTP status instead
/// and the raw body (when printable) becomes the message.
pub(crate) fn parse_error_body(status: http::StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBodyJson>(body) {
        Ok(parsed) => {
            let code = parsed
                .error
                .code
                .parse()
                .unwrap_or_else(|_| http_status_to_code(status));

            match parsed.error.message {
                Some(message) => ClientError::new(code, message),
                None => ClientError::from_code(code),
            }
        }
        Err(_) => {
            let code = http_status_to_code(status);
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error")
            } else {
                std::str::from_utf8(body).unwrap_or("unknown error")
            };
            ClientError::new(code, message)
        }
    }
}

/// Map an HTTP status code to a canonical error code.
///
/// This is used as a fallback when the response body doesn't contain a
/// parsable error document.
pub(crate) fn http_status_to_code(status: http::StatusCode) -> Code {
    match status.as_u16() {
        200 => Code::Ok,
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        408 => Code::DeadlineExceeded,
        409 => Code::AlreadyExists,
        412 => Code::FailedPrecondition,
        416 => Code::OutOfRange,
        429 => Code::ResourceExhausted,
        499 => Code::Canceled, // Client Closed Request (nginx)
        500 => Code::Internal,
        501 => Code::Unimplemented,
        502..=504 => Code::Unavailable,
        _ => Code::Unknown,
    }
}

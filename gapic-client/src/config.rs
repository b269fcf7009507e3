//! Call options, channel arguments, and their resolution.
//!
//! Configuration is layered. Every option resolves independently, closest
//! scope first:
//!
//! 1. per-call [`CallOptions`] passed to the invocation
//! 2. per-method entries from [`ServiceConfig`](crate::method::ServiceConfig)
//! 3. client-wide defaults from [`ClientBuilder`](crate::builder::ClientBuilder)
//! 4. service-wide defaults from [`ServiceConfig`](crate::method::ServiceConfig)
//! 5. library defaults ([`defaults`])
//!
//! Setting a timeout at one layer never disturbs the retry policy resolved
//! from another.

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::retry::RetryPolicy;

pub mod retry;

/// Library-wide call defaults, used when no other layer sets an option.
pub mod defaults {
    use std::time::Duration;

    /// Overall per-call timeout.
    pub const TIMEOUT: Duration = Duration::from_secs(30);

    /// Largest message the client will accept, in bytes.
    pub const MAX_RECEIVE_MESSAGE_LENGTH: usize = 4 * 1024 * 1024;

    /// Largest response metadata block the client will accept, in bytes.
    pub const MAX_METADATA_SIZE: usize = 8 * 1024;
}

/// Error raised while building or resolving configuration.
///
/// Configuration problems surface here, when the option is set, not later
/// when a call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The named option is not one this client understands.
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    /// The option exists but the supplied value is out of range.
    #[error("invalid value for {option}: {reason}")]
    InvalidValue { option: String, reason: String },
    /// The endpoint string could not be parsed into a URI.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    /// A configuration document failed to parse.
    #[error("invalid configuration document: {0}")]
    Parse(String),
}

/// Options for a single call.
///
/// All fields are optional; unset fields fall through to the next
/// configuration layer. Construct with the builder methods:
///
/// ```
/// use std::time::Duration;
/// use gapic_client::{CallOptions, RetryPolicy};
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .retry_policy(RetryPolicy::no_retry())
///     .header("x-goog-request-params", "parent=projects/demo");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall deadline for the call, spanning every retry attempt.
    pub timeout: Option<Duration>,
    /// Retry policy for the call.
    pub retry_policy: Option<RetryPolicy>,
    /// Extra request metadata, sent as HTTP headers.
    pub metadata: HeaderMap,
}

impl CallOptions {
    /// Create empty options. Every field falls through to the next layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overall deadline for the call, including retries.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy for the call.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Disable retries for the call.
    pub fn no_retry(self) -> Self {
        self.retry_policy(RetryPolicy::no_retry())
    }

    /// Add a metadata header.
    ///
    /// # Panics
    ///
    /// Panics if the key or value is not a valid HTTP header. Use
    /// [`CallOptions::try_header`] to handle invalid input gracefully.
    pub fn header(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match self.try_header(key.as_ref(), value.as_ref()) {
            Ok(options) => options,
            Err(e) => panic!("invalid metadata header: {e}"),
        }
    }

    /// Add a metadata header, rejecting invalid names or values.
    pub fn try_header(mut self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let name: HeaderName = key.parse().map_err(|_| ConfigError::InvalidValue {
            option: "metadata".to_string(),
            reason: format!("invalid header name {key:?}"),
        })?;
        let value: HeaderValue = value.parse().map_err(|_| ConfigError::InvalidValue {
            option: "metadata".to_string(),
            reason: format!("invalid header value for {key:?}"),
        })?;
        self.metadata.append(name, value);
        Ok(self)
    }

    /// Fill unset options from `defaults`.
    ///
    /// Each option merges independently: a timeout set here never masks a
    /// retry policy set in `defaults`, and vice versa. Metadata keys set
    /// here replace same-named keys from `defaults`; other keys pass
    /// through.
    pub fn merge_defaults(mut self, defaults: &CallOptions) -> Self {
        if self.timeout.is_none() {
            self.timeout = defaults.timeout;
        }
        if self.retry_policy.is_none() {
            self.retry_policy = defaults.retry_policy.clone();
        }
        if !defaults.metadata.is_empty() {
            let mut merged = defaults.metadata.clone();
            for name in self.metadata.keys() {
                merged.remove(name);
            }
            for (name, value) in self.metadata.iter() {
                merged.append(name.clone(), value.clone());
            }
            self.metadata = merged;
        }
        self
    }
}

/// Transport-level tuning knobs, applied when a channel is built.
///
/// Every knob can also be set by name through [`ChannelArgs::set`], which
/// rejects unknown names up front:
///
/// ```
/// use gapic_client::ChannelArgs;
///
/// let mut args = ChannelArgs::new();
/// args.set("max_receive_message_length", 16 * 1024 * 1024).unwrap();
/// args.set("keepalive_time", 30_000).unwrap();
/// assert!(args.set("max_concurrent_streams", 100).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelArgs {
    /// Largest message the client will send, in bytes. `None` is unlimited.
    pub max_send_message_length: Option<usize>,
    /// Largest message the client will accept, in bytes. `None` is
    /// unlimited.
    pub max_receive_message_length: Option<usize>,
    /// Interval between HTTP/2 keepalive pings while a connection is idle.
    /// `None` disables keepalive pings.
    pub keepalive_time: Option<Duration>,
    /// How long to wait for a keepalive ping acknowledgement before the
    /// connection is considered dead.
    pub keepalive_timeout: Option<Duration>,
    /// Largest response metadata block the client will accept, in bytes.
    /// `None` is unlimited.
    pub max_metadata_size: Option<usize>,
}

impl Default for ChannelArgs {
    fn default() -> Self {
        Self {
            max_send_message_length: None,
            max_receive_message_length: Some(defaults::MAX_RECEIVE_MESSAGE_LENGTH),
            keepalive_time: None,
            keepalive_timeout: None,
            max_metadata_size: Some(defaults::MAX_METADATA_SIZE),
        }
    }
}

impl ChannelArgs {
    /// Create channel arguments with the library defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one argument by name.
    ///
    /// Sizes are in bytes and accept `-1` for unlimited; keepalive options
    /// are in milliseconds and must be positive. Unknown names are rejected
    /// with [`ConfigError::UnknownOption`].
    pub fn set(&mut self, name: &str, value: i64) -> Result<(), ConfigError> {
        match name {
            "max_send_message_length" => {
                self.max_send_message_length = parse_size(name, value)?;
            }
            "max_receive_message_length" => {
                self.max_receive_message_length = parse_size(name, value)?;
            }
            "keepalive_time" => {
                self.keepalive_time = Some(parse_millis(name, value)?);
            }
            "keepalive_timeout" => {
                self.keepalive_timeout = Some(parse_millis(name, value)?);
            }
            "max_metadata_size" => {
                self.max_metadata_size = parse_size(name, value)?;
            }
            _ => return Err(ConfigError::UnknownOption(name.to_string())),
        }
        Ok(())
    }
}

fn parse_size(option: &str, value: i64) -> Result<Option<usize>, ConfigError> {
    match value {
        -1 => Ok(None),
        v if v >= 0 => Ok(Some(v as usize)),
        _ => Err(ConfigError::InvalidValue {
            option: option.to_string(),
            reason: format!("expected a byte count or -1 for unlimited, got {value}"),
        }),
    }
}

fn parse_millis(option: &str, value: i64) -> Result<Duration, ConfigError> {
    if value > 0 {
        Ok(Duration::from_millis(value as u64))
    } else {
        Err(ConfigError::InvalidValue {
            option: option.to_string(),
            reason: format!("expected a positive millisecond count, got {value}"),
        })
    }
}

/// Largest timeout expressible in the `x-timeout-ms` request header.
pub(crate) const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Format a deadline for the `x-timeout-ms` request header.
///
/// Sub-millisecond timeouts round up to 1ms so a tight deadline is never
/// silently dropped; values beyond [`MAX_TIMEOUT_MS`] are clamped.
pub(crate) fn duration_to_timeout_header(timeout: Duration) -> String {
    let millis = timeout.as_millis().clamp(1, MAX_TIMEOUT_MS);
    millis.to_string()
}

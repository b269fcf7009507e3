//! Method descriptors and per-service configuration.
//!
//! A service is represented as data: one [`MethodDescriptor`] per RPC, plus
//! an optional [`ServiceConfig`] carrying call defaults. A single generic
//! invocation engine ([`Client`](crate::client::Client)) consumes the
//! descriptors, so adding a service means adding descriptors, not client
//! code.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::retry::RetryPolicy;
use crate::config::{CallOptions, ConfigError};

/// Whether an RPC method is safe to retry automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Repeating the call cannot duplicate side effects.
    Idempotent,
    /// Repeating the call may duplicate side effects. Such methods are
    /// retried only when the retry policy explicitly opts in.
    NonIdempotent,
}

impl Idempotency {
    /// Returns true for [`Idempotency::Idempotent`].
    pub fn is_idempotent(self) -> bool {
        matches!(self, Idempotency::Idempotent)
    }
}

/// Static description of one RPC method.
///
/// Service bindings declare one descriptor per method, typically as
/// constants:
///
/// ```
/// use gapic_client::{Idempotency, MethodDescriptor};
///
/// const GET_TABLE: MethodDescriptor = MethodDescriptor::new(
///     "google.bigtable.admin.v2.BigtableTableAdmin/GetTable",
///     Idempotency::Idempotent,
/// );
///
/// assert_eq!(GET_TABLE.service(), "google.bigtable.admin.v2.BigtableTableAdmin");
/// assert_eq!(GET_TABLE.method(), "GetTable");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Fully-qualified `package.Service/Method` path.
    pub path: &'static str,
    /// Whether the method may be retried without explicit opt-in.
    pub idempotency: Idempotency,
}

impl MethodDescriptor {
    /// Create a descriptor.
    pub const fn new(path: &'static str, idempotency: Idempotency) -> Self {
        Self { path, idempotency }
    }

    /// The fully-qualified service name, i.e. the part before the slash.
    pub fn service(&self) -> &'static str {
        match self.path.split_once('/') {
            Some((service, _)) => service,
            None => self.path,
        }
    }

    /// The bare method name, i.e. the part after the slash.
    pub fn method(&self) -> &'static str {
        match self.path.split_once('/') {
            Some((_, method)) => method,
            None => self.path,
        }
    }
}

/// Call defaults for a service, optionally refined per method.
///
/// Lookup is per option: a per-method entry overrides the service-wide
/// defaults only for the options it actually sets.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Service-wide call defaults.
    pub defaults: CallOptions,
    /// Per-method overrides, keyed by bare method name.
    pub methods: HashMap<String, CallOptions>,
}

impl ServiceConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service-wide defaults.
    pub fn defaults(mut self, options: CallOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Set the defaults for one method, keyed by its bare name.
    pub fn method(mut self, name: impl Into<String>, options: CallOptions) -> Self {
        self.methods.insert(name.into(), options);
        self
    }

    /// The configured entry for one method, if any.
    pub fn method_options(&self, method: &MethodDescriptor) -> Option<&CallOptions> {
        self.methods.get(method.method())
    }

    /// Load a service configuration from its JSON document form.
    ///
    /// The document mirrors the shape shipped alongside generated service
    /// bindings:
    ///
    /// ```json
    /// {
    ///   "timeout_ms": 30000,
    ///   "retry": {
    ///     "retryable_codes": ["unavailable", "deadline_exceeded"],
    ///     "initial_backoff_ms": 1000,
    ///     "max_backoff_ms": 120000,
    ///     "multiplier": 1.6,
    ///     "max_attempts": 4
    ///   },
    ///   "methods": {
    ///     "MutateRow": { "timeout_ms": 60000 },
    ///     "CreateInstance": { "retry": { "max_attempts": 1 } }
    ///   }
    /// }
    /// ```
    ///
    /// Unknown keys and unparsable values are rejected here, at
    /// configuration time, rather than when a call is made.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let doc: ServiceConfigJson =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = ServiceConfig::new().defaults(doc.options()?);
        for (name, method) in doc.methods {
            config.methods.insert(name, method.options()?);
        }
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceConfigJson {
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    retry: Option<RetryJson>,
    #[serde(default)]
    methods: HashMap<String, MethodJson>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodJson {
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    retry: Option<RetryJson>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryJson {
    #[serde(default)]
    retryable_codes: Option<Vec<String>>,
    #[serde(default)]
    initial_backoff_ms: Option<u64>,
    #[serde(default)]
    max_backoff_ms: Option<u64>,
    #[serde(default)]
    multiplier: Option<f64>,
    #[serde(default)]
    max_attempts: Option<u32>,
}

impl ServiceConfigJson {
    fn options(&self) -> Result<CallOptions, ConfigError> {
        build_options(self.timeout_ms, self.retry.as_ref())
    }
}

impl MethodJson {
    fn options(&self) -> Result<CallOptions, ConfigError> {
        build_options(self.timeout_ms, self.retry.as_ref())
    }
}

fn build_options(
    timeout_ms: Option<u64>,
    retry: Option<&RetryJson>,
) -> Result<CallOptions, ConfigError> {
    let mut options = CallOptions::new();
    if let Some(ms) = timeout_ms {
        options = options.timeout(std::time::Duration::from_millis(ms));
    }
    if let Some(retry) = retry {
        options = options.retry_policy(retry.policy()?);
    }
    Ok(options)
}

impl RetryJson {
    fn policy(&self) -> Result<RetryPolicy, ConfigError> {
        let mut policy = RetryPolicy::new();
        if let Some(codes) = &self.retryable_codes {
            let mut parsed = Vec::with_capacity(codes.len());
            for code in codes {
                parsed.push(code.parse().map_err(|_| ConfigError::InvalidValue {
                    option: "retryable_codes".to_string(),
                    reason: format!("unknown status code {code:?}"),
                })?);
            }
            policy.retryable_codes = parsed;
        }
        if let Some(ms) = self.initial_backoff_ms {
            policy.initial_backoff = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_backoff_ms {
            policy.max_backoff = std::time::Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.multiplier {
            policy.multiplier = multiplier;
        }
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        policy.validate().map_err(|reason| ConfigError::InvalidValue {
            option: "retry".to_string(),
            reason: reason.to_string(),
        })?;
        Ok(policy)
    }
}

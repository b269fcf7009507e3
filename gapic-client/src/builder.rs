//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`Client`].

use std::time::Duration;

use crate::client::Client;
use crate::config::{CallOptions, ChannelArgs};
use crate::config::retry::RetryPolicy;
use crate::credentials::Credentials;
use crate::error::ClientError;
use crate::method::ServiceConfig;
use crate::transport::{Channel, ChannelBuilder, TlsClientConfig};

/// Builder for creating a [`Client`].
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use gapic_client::{ClientBuilder, Credentials};
///
/// let client = ClientBuilder::new("https://example.googleapis.com")
///     .credentials(Credentials::bearer("token")?)
///     .default_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    /// Transport configuration, used when no channel is supplied.
    channel_builder: ChannelBuilder,
    /// Optional pre-built channel.
    channel: Option<Channel>,
    /// Per-service call defaults.
    service_config: ServiceConfig,
    /// Client-wide call defaults.
    default_options: CallOptions,
}

impl ClientBuilder {
    /// Create a new ClientBuilder for the given endpoint.
    ///
    /// The endpoint is a host with optional scheme and port, e.g.
    /// `"https://example.googleapis.com"` or `"localhost:8080"`. A bare
    /// host defaults to `https`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            channel_builder: Channel::builder(endpoint),
            channel: None,
            service_config: ServiceConfig::new(),
            default_options: CallOptions::new(),
        }
    }

    /// Use a pre-built channel.
    ///
    /// Channels are cheap to clone and share one connection pool across
    /// clones, so this is the way to serve several clients from a single
    /// pool. When a channel is supplied the transport options on this
    /// builder (credentials, channel args, TLS, pool tuning) have no
    /// effect; the channel is used as-is.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let channel = Channel::builder("https://example.googleapis.com")
    ///     .credentials(Credentials::bearer("token")?)
    ///     .build()?;
    ///
    /// let instances = ClientBuilder::new("https://example.googleapis.com")
    ///     .channel(channel.clone())
    ///     .build()?;
    /// let operations = ClientBuilder::new("https://example.googleapis.com")
    ///     .channel(channel)
    ///     .build()?;
    /// ```
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the credentials attached to every request.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.channel_builder = self.channel_builder.credentials(credentials);
        self
    }

    /// Set the transport tuning knobs for the channel.
    pub fn channel_args(mut self, args: ChannelArgs) -> Self {
        self.channel_builder = self.channel_builder.channel_args(args);
        self
    }

    /// Use a custom TLS configuration.
    ///
    /// Also switches plain-looking endpoints to TLS, the same as
    /// [`ChannelBuilder::tls_config`].
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.channel_builder = self.channel_builder.tls_config(config);
        self
    }

    /// Control whether the channel speaks HTTP/2 exclusively.
    ///
    /// On by default. Turn off only for servers that cannot negotiate
    /// HTTP/2; streaming calls require it.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.channel_builder = self.channel_builder.http2_only(enabled);
        self
    }

    /// Set how long idle pooled connections are kept around.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.channel_builder = self.channel_builder.pool_idle_timeout(timeout);
        self
    }

    /// Set the maximum number of idle pooled connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.channel_builder = self.channel_builder.pool_max_idle_per_host(max);
        self
    }

    /// Install the per-service call defaults.
    ///
    /// Parse a JSON document with [`ServiceConfig::from_json`] or build one
    /// in code. Method entries resolve per option on top of the
    /// service-wide defaults.
    pub fn service_config(mut self, config: ServiceConfig) -> Self {
        self.service_config = config;
        self
    }

    /// Set the client-wide call defaults in one piece.
    pub fn default_options(mut self, options: CallOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Set the default deadline for calls, spanning every retry attempt.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_options = self.default_options.timeout(timeout);
        self
    }

    /// Set the default retry policy for calls.
    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_options = self.default_options.retry_policy(policy);
        self
    }

    /// Add a metadata header sent with every call.
    ///
    /// # Panics
    ///
    /// Panics if the key or value is not a valid HTTP header, the same as
    /// [`CallOptions::header`].
    pub fn header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.default_options = self.default_options.header(key, value);
        self
    }

    /// Build the client.
    ///
    /// Fails if the endpoint cannot be parsed.
    pub fn build(self) -> Result<Client, ClientError> {
        let channel = match self.channel {
            Some(channel) => channel,
            None => self.channel_builder.build()?,
        };
        Ok(Client::from_parts(
            channel,
            self.service_config,
            self.default_options,
        ))
    }
}

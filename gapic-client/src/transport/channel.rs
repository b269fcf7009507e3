//! Pooled HTTP/2 channel to a single service endpoint.
//!
//! A [`Channel`] owns a hyper connection pool plus everything that applies to
//! every call on it: the endpoint, credentials, and [`ChannelArgs`] limits.
//! Channels are cheap to clone; clones share the pool and counters.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, Uri, header};
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::time::timeout;

use gapic_core::wrap_envelope;

use crate::ClientError;
use crate::config::{ChannelArgs, ConfigError, duration_to_timeout_header};
use crate::credentials::Credentials;
use crate::transport::TransportBody;
use crate::transport::connector::{build_http_connector, build_https_connector};

/// Content type for unary request and response bodies.
pub(crate) const CONTENT_TYPE_UNARY: &str = "application/proto";

/// Content type for enveloped streaming bodies.
pub(crate) const CONTENT_TYPE_STREAMING: &str = "application/proto-stream";

/// Header carrying the call deadline, in milliseconds.
pub(crate) const TIMEOUT_HEADER: &str = "x-timeout-ms";

/// Header carrying the per-call trace id.
pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Check if a header name is managed by the transport.
///
/// Managed headers are derived from the call itself; user-supplied metadata
/// must not overwrite them.
fn is_reserved_header(name: &http::header::HeaderName) -> bool {
    let name_str = name.as_str();
    name_str == "content-type"
        || name_str == "content-length"
        || name_str == "host"
        || name_str == "te"
        || name_str == TIMEOUT_HEADER
}

/// Generate a trace id for a call.
///
/// The id is attached as [`REQUEST_ID_HEADER`] on every attempt of the call,
/// so server logs can correlate retries of the same logical operation.
pub(crate) fn new_request_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// The hyper connection pool, dispatched on connector type.
#[derive(Clone)]
enum Pool {
    Https(Client<HttpsConnector<HttpConnector>, TransportBody>),
    Http(Client<HttpConnector, TransportBody>),
}

impl Pool {
    async fn request(
        &self,
        req: Request<TransportBody>,
    ) -> Result<Response<Incoming>, ClientError> {
        let result = match self {
            Pool::Https(client) => client.request(req).await,
            Pool::Http(client) => client.request(req).await,
        };
        result.map_err(|e| ClientError::Transport(format!("request failed: {}", e)))
    }
}

/// Cumulative per-channel counters, shared by all clones.
#[derive(Default)]
struct ChannelMetrics {
    calls_started: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    streams_opened: AtomicU64,
}

impl ChannelMetrics {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            calls_started: self.calls_started.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of channel health counters.
///
/// Counters are transport-level: a call counts as succeeded once its
/// response phase completed, regardless of the status the server encoded in
/// it. All clones of a channel feed the same counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Calls handed to the transport, including those that later failed.
    pub calls_started: u64,
    /// Calls whose response phase completed.
    pub calls_succeeded: u64,
    /// Calls that failed before a response was fully received.
    pub calls_failed: u64,
    /// Streaming calls that received response headers.
    pub streams_opened: u64,
}

/// A pooled HTTP/2 connection to a single endpoint.
///
/// Built via [`Channel::builder`]. The channel carries the credentials and
/// message-size limits it was constructed with and applies them to every
/// call. Cloning is cheap and shares the underlying pool, so one channel
/// can serve many concurrent calls over multiplexed HTTP/2 streams.
///
/// # Example
///
/// ```ignore
/// use gapic_client::transport::Channel;
///
/// let channel = Channel::builder("https://example.googleapis.com")
///     .credentials(Credentials::bearer("token")?)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct Channel {
    pool: Pool,
    endpoint: Uri,
    credentials: Credentials,
    args: ChannelArgs,
    metrics: Arc<ChannelMetrics>,
    http2_only: bool,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("args", &self.args)
            .field("http2_only", &self.http2_only)
            .finish()
    }
}

impl Channel {
    /// Create a new [`ChannelBuilder`] for the given endpoint.
    ///
    /// The endpoint may be a bare authority (`example.googleapis.com`), in
    /// which case `https://` is assumed.
    pub fn builder(endpoint: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(endpoint)
    }

    /// The endpoint this channel is connected to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// The channel arguments this channel was built with.
    pub fn args(&self) -> &ChannelArgs {
        &self.args
    }

    /// Whether the channel negotiates HTTP/2 only.
    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }

    /// Snapshot the channel's health counters.
    pub fn stats(&self) -> ChannelStats {
        self.metrics.snapshot()
    }

    /// Send a single request message and buffer the complete response.
    ///
    /// `message` is the encoded request payload. `timeout` bounds the whole
    /// exchange, from sending the request to collecting the response body,
    /// and is also propagated to the server via [`TIMEOUT_HEADER`].
    ///
    /// The response is returned whole, whatever its HTTP status; mapping a
    /// non-success status onto an error is the caller's concern.
    ///
    /// # Errors
    ///
    /// - `ResourceExhausted` if the request or response exceeds the
    ///   configured size limits
    /// - `DeadlineExceeded` if `timeout` elapses
    /// - `Unavailable` (as [`ClientError::Transport`]) if the request fails
    ///   at the connection level
    pub async fn invoke_unary(
        &self,
        path: &str,
        message: Bytes,
        timeout: Option<Duration>,
        metadata: &HeaderMap,
    ) -> Result<Response<Bytes>, ClientError> {
        self.metrics.calls_started.fetch_add(1, Ordering::Relaxed);

        let result = self.send_unary(path, message, timeout, metadata).await;
        match &result {
            Ok(_) => self.metrics.calls_succeeded.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.metrics.calls_failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    async fn send_unary(
        &self,
        path: &str,
        message: Bytes,
        deadline: Option<Duration>,
        metadata: &HeaderMap,
    ) -> Result<Response<Bytes>, ClientError> {
        // 1. Enforce the send limit before anything leaves the client.
        self.check_send_size(message.len())?;

        // 2. Build the request.
        let req = self.build_request(
            path,
            CONTENT_TYPE_UNARY,
            TransportBody::full(message),
            deadline,
            metadata,
        )?;

        // 3. Send and collect, bounded by the deadline when one is set.
        let exchange = async {
            let response = self.pool.request(req).await?;
            self.check_metadata_size(response.headers())?;

            let (parts, body) = response.into_parts();
            let limit = self.args.max_receive_message_length.unwrap_or(usize::MAX);
            let collected = Limited::new(body, limit).collect().await.map_err(|e| {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    ClientError::resource_exhausted(format!(
                        "response body exceeds max_receive_message_length ({} bytes)",
                        limit
                    ))
                } else {
                    ClientError::Transport(format!("failed to read response body: {}", e))
                }
            })?;

            Ok(Response::from_parts(parts, collected.to_bytes()))
        };

        match deadline {
            Some(t) => timeout(t, exchange)
                .await
                .map_err(|_| ClientError::deadline_exceeded("deadline exceeded awaiting response"))?,
            None => exchange.await,
        }
    }

    /// Send a single request message and return the streaming response body.
    ///
    /// The request payload is wrapped in an envelope frame; the response body
    /// is handed back still streaming so callers can decode frames as they
    /// arrive. `timeout` bounds the wait for response headers only, since the
    /// stream may legitimately stay open long past any single-exchange
    /// deadline; it is still propagated to the server via [`TIMEOUT_HEADER`].
    pub async fn invoke_streaming(
        &self,
        path: &str,
        message: Bytes,
        timeout: Option<Duration>,
        metadata: &HeaderMap,
    ) -> Result<Response<Incoming>, ClientError> {
        self.metrics.calls_started.fetch_add(1, Ordering::Relaxed);

        let result = self.open_stream(path, message, timeout, metadata).await;
        match &result {
            Ok(_) => {
                self.metrics.calls_succeeded.fetch_add(1, Ordering::Relaxed);
                self.metrics.streams_opened.fetch_add(1, Ordering::Relaxed)
            }
            Err(_) => self.metrics.calls_failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    async fn open_stream(
        &self,
        path: &str,
        message: Bytes,
        deadline: Option<Duration>,
        metadata: &HeaderMap,
    ) -> Result<Response<Incoming>, ClientError> {
        // 1. Enforce the send limit on the bare message, then envelope it.
        self.check_send_size(message.len())?;
        let framed = Bytes::from(wrap_envelope(&message));

        // 2. Build the request.
        let req = self.build_request(
            path,
            CONTENT_TYPE_STREAMING,
            TransportBody::full(framed),
            deadline,
            metadata,
        )?;

        // 3. Send, bounding only the wait for response headers.
        let response = match deadline {
            Some(t) => timeout(t, self.pool.request(req))
                .await
                .map_err(|_| ClientError::deadline_exceeded("deadline exceeded awaiting response"))??,
            None => self.pool.request(req).await?,
        };

        self.check_metadata_size(response.headers())?;
        Ok(response)
    }

    fn build_request(
        &self,
        path: &str,
        content_type: &'static str,
        body: TransportBody,
        deadline: Option<Duration>,
        metadata: &HeaderMap,
    ) -> Result<Request<TransportBody>, ClientError> {
        // 1. Transport-managed headers.
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        if let Some(t) = deadline {
            headers.insert(TIMEOUT_HEADER, duration_to_timeout_header(t).parse().unwrap());
        }

        // 2. Caller metadata (reserved names are dropped, multi-values kept).
        for (name, value) in metadata.iter() {
            if !is_reserved_header(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        // 3. Credentials, then a trace id unless the caller set one.
        self.credentials.apply(&mut headers);
        if !headers.contains_key(REQUEST_ID_HEADER) {
            headers.insert(REQUEST_ID_HEADER, new_request_id().parse().unwrap());
        }

        // 4. Assemble the request.
        let uri = self.request_uri(path)?;
        let mut req_builder = Request::builder().method(Method::POST).uri(&uri);
        for (name, value) in headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        req_builder
            .body(body)
            .map_err(|e| ClientError::internal(format!("failed to build request: {}", e)))
    }

    /// Resolve a procedure path against the channel endpoint.
    fn request_uri(&self, path: &str) -> Result<Uri, ClientError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut parts = self.endpoint.clone().into_parts();
        parts.path_and_query = Some(
            format!("/{}", path)
                .parse()
                .map_err(|_| ClientError::invalid_argument(format!("invalid request path {:?}", path)))?,
        );

        Uri::from_parts(parts)
            .map_err(|e| ClientError::invalid_argument(format!("invalid request uri: {}", e)))
    }

    fn check_send_size(&self, len: usize) -> Result<(), ClientError> {
        if let Some(limit) = self.args.max_send_message_length {
            if len > limit {
                return Err(ClientError::resource_exhausted(format!(
                    "request message is {} bytes, max_send_message_length is {}",
                    len, limit
                )));
            }
        }
        Ok(())
    }

    fn check_metadata_size(&self, headers: &HeaderMap) -> Result<(), ClientError> {
        let Some(limit) = self.args.max_metadata_size else {
            return Ok(());
        };

        let size: usize = headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        if size > limit {
            return Err(ClientError::resource_exhausted(format!(
                "response metadata is {} bytes, max_metadata_size is {}",
                size, limit
            )));
        }
        Ok(())
    }
}

/// Raw request passthrough for tower middleware stacks.
///
/// Metadata, credentials, and size limits are NOT applied on this path; it
/// exists so a channel can sit at the bottom of a `tower` stack.
impl tower_service::Service<Request<TransportBody>> for Channel {
    type Response = Response<Incoming>;
    type Error = ClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // hyper's legacy client pools internally and is always ready
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<TransportBody>) -> Self::Future {
        let channel = self.clone();
        Box::pin(async move { channel.pool.request(req).await })
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Uri, ConfigError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    let uri: Uri = normalized
        .parse()
        .map_err(|_| ConfigError::InvalidEndpoint(endpoint.to_string()))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(ConfigError::InvalidEndpoint(endpoint.to_string())),
    }
    if uri.authority().is_none() {
        return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
    }

    Ok(uri)
}

/// Builder for [`Channel`].
///
/// # Example
///
/// ```ignore
/// use gapic_client::transport::Channel;
/// use std::time::Duration;
///
/// let channel = Channel::builder("https://example.googleapis.com")
///     .pool_idle_timeout(Duration::from_secs(60))
///     .pool_max_idle_per_host(16)
///     .build()?;
/// ```
pub struct ChannelBuilder {
    endpoint: String,
    credentials: Credentials,
    args: ChannelArgs,
    tls_config: Option<rustls::ClientConfig>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
}

impl std::fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("args", &self.args)
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}

impl ChannelBuilder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials::Anonymous,
            args: ChannelArgs::default(),
            tls_config: None,
            http2_only: true,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }

    /// Set the credentials attached to every call on the channel.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the channel arguments (size limits, keepalive).
    pub fn channel_args(mut self, args: ChannelArgs) -> Self {
        self.args = args;
        self
    }

    /// Use a custom rustls configuration instead of the feature-gated
    /// default (e.g. for pinned roots or client certificates).
    pub fn tls_config(mut self, config: rustls::ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Force HTTP/2 (prior knowledge) instead of negotiating the version.
    ///
    /// Enabled by default: multiplexing and server streaming need HTTP/2,
    /// and it lets `http://` endpoints skip the upgrade handshake. Disable
    /// only for servers that cannot speak HTTP/2 at all.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// How long an idle pooled connection is kept before being closed.
    ///
    /// Defaults to 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Keep idle pooled connections around indefinitely.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Maximum idle connections kept per host.
    ///
    /// Defaults to 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] (as a [`ClientError`]) if the
    /// endpoint is not a valid `http` or `https` authority.
    pub fn build(self) -> Result<Channel, ClientError> {
        // 1. Normalize and validate the endpoint.
        let endpoint = parse_endpoint(&self.endpoint)?;
        let use_tls = endpoint.scheme_str() == Some("https") || self.tls_config.is_some();

        // 2. Assemble the pooled hyper client.
        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(idle) = self.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }
        builder.timer(TokioTimer::new());
        if let Some(interval) = self.args.keepalive_time {
            builder.http2_keep_alive_interval(interval);
        }
        if let Some(keepalive_timeout) = self.args.keepalive_timeout {
            builder.http2_keep_alive_timeout(keepalive_timeout);
        }

        let pool = if use_tls {
            Pool::Https(builder.build(build_https_connector(self.tls_config)))
        } else {
            Pool::Http(builder.build(build_http_connector()))
        };

        Ok(Channel {
            pool,
            endpoint,
            credentials: self.credentials,
            args: self.args,
            metrics: Arc::new(ChannelMetrics::default()),
            http2_only: self.http2_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapic_core::Code;
    use http::header::HeaderName;

    #[test]
    fn test_builder_defaults() {
        let builder = Channel::builder("https://example.googleapis.com");
        assert!(builder.http2_only);
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(builder.pool_max_idle_per_host, 32);
        assert!(builder.tls_config.is_none());
    }

    #[test]
    fn test_parse_endpoint_assumes_https() {
        let uri = parse_endpoint("example.googleapis.com").unwrap();
        assert_eq!(uri.scheme_str(), Some("https"));
        assert_eq!(uri.host(), Some("example.googleapis.com"));
    }

    #[test]
    fn test_parse_endpoint_keeps_port() {
        let uri = parse_endpoint("http://localhost:8080").unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.port_u16(), Some(8080));
    }

    #[test]
    fn test_parse_endpoint_rejects_unknown_scheme() {
        let err = parse_endpoint("ftp://example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_parse_endpoint_rejects_missing_authority() {
        assert!(parse_endpoint("https://").is_err());
    }

    #[test]
    fn test_build_http_channel() {
        let channel = Channel::builder("http://localhost:8080").build().unwrap();
        assert_eq!(channel.endpoint().scheme_str(), Some("http"));
        assert!(channel.is_http2_only());
        assert_eq!(channel.stats(), ChannelStats::default());
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-native-roots", feature = "tls-webpki-roots")
    ))]
    #[test]
    fn test_build_https_channel() {
        let channel = Channel::builder("example.googleapis.com").build().unwrap();
        assert_eq!(channel.endpoint().scheme_str(), Some("https"));
    }

    #[test]
    fn test_request_uri_joins_path() {
        let channel = Channel::builder("http://localhost:8080").build().unwrap();
        let uri = channel
            .request_uri("example.v1.ExampleService/GetItem")
            .unwrap();
        assert_eq!(uri.path(), "/example.v1.ExampleService/GetItem");
        assert_eq!(uri.host(), Some("localhost"));

        // A leading slash is tolerated
        let uri = channel.request_uri("/svc/Method").unwrap();
        assert_eq!(uri.path(), "/svc/Method");
    }

    #[test]
    fn test_reserved_headers() {
        assert!(is_reserved_header(&header::CONTENT_TYPE));
        assert!(is_reserved_header(&HeaderName::from_static("x-timeout-ms")));
        assert!(is_reserved_header(&HeaderName::from_static("host")));
        assert!(!is_reserved_header(&HeaderName::from_static(
            "x-goog-request-params"
        )));
        assert!(!is_reserved_header(&HeaderName::from_static("x-request-id")));
    }

    #[test]
    fn test_request_id_format() {
        let id = new_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_request_id());
    }

    #[test]
    fn test_build_request_headers() {
        let channel = Channel::builder("http://localhost:8080").build().unwrap();

        let mut metadata = HeaderMap::new();
        metadata.insert("x-goog-request-params", "parent=projects/p".parse().unwrap());
        // Reserved names in metadata must not leak through
        metadata.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        let req = channel
            .build_request(
                "svc/Method",
                CONTENT_TYPE_UNARY,
                TransportBody::empty(),
                Some(Duration::from_secs(5)),
                &metadata,
            )
            .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(
            req.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE_UNARY
        );
        assert_eq!(req.headers().get(TIMEOUT_HEADER).unwrap(), "5000");
        assert_eq!(
            req.headers().get("x-goog-request-params").unwrap(),
            "parent=projects/p"
        );
        assert!(req.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn test_build_request_keeps_caller_request_id() {
        let channel = Channel::builder("http://localhost:8080").build().unwrap();

        let mut metadata = HeaderMap::new();
        metadata.insert(REQUEST_ID_HEADER, "deadbeef".parse().unwrap());

        let req = channel
            .build_request(
                "svc/Method",
                CONTENT_TYPE_UNARY,
                TransportBody::empty(),
                None,
                &metadata,
            )
            .unwrap();
        assert_eq!(req.headers().get(REQUEST_ID_HEADER).unwrap(), "deadbeef");
    }

    #[test]
    fn test_build_request_applies_credentials() {
        let channel = Channel::builder("http://localhost:8080")
            .credentials(Credentials::bearer("token").unwrap())
            .build()
            .unwrap();

        let req = channel
            .build_request(
                "svc/Method",
                CONTENT_TYPE_UNARY,
                TransportBody::empty(),
                None,
                &HeaderMap::new(),
            )
            .unwrap();
        assert_eq!(
            req.headers().get(header::AUTHORIZATION).unwrap(),
            "Bearer token"
        );
    }

    #[tokio::test]
    async fn test_unary_rejects_oversized_request() {
        let mut args = ChannelArgs::default();
        args.max_send_message_length = Some(8);
        let channel = Channel::builder("http://localhost:8080")
            .channel_args(args)
            .build()
            .unwrap();

        let err = channel
            .invoke_unary(
                "svc/Method",
                Bytes::from(vec![0u8; 16]),
                None,
                &HeaderMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);

        let stats = channel.stats();
        assert_eq!(stats.calls_started, 1);
        assert_eq!(stats.calls_failed, 1);
        assert_eq!(stats.calls_succeeded, 0);
    }

    #[tokio::test]
    async fn test_streaming_rejects_oversized_request() {
        let mut args = ChannelArgs::default();
        args.max_send_message_length = Some(8);
        let channel = Channel::builder("http://localhost:8080")
            .channel_args(args)
            .build()
            .unwrap();

        let err = channel
            .invoke_streaming(
                "svc/Method",
                Bytes::from(vec![0u8; 16]),
                None,
                &HeaderMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(channel.stats().streams_opened, 0);
    }

    #[test]
    fn test_check_metadata_size() {
        let mut args = ChannelArgs::default();
        args.max_metadata_size = Some(16);
        let channel = Channel::builder("http://localhost:8080")
            .channel_args(args)
            .build()
            .unwrap();

        let mut small = HeaderMap::new();
        small.insert("x-a", "b".parse().unwrap());
        assert!(channel.check_metadata_size(&small).is_ok());

        let mut large = HeaderMap::new();
        large.insert("x-very-long-header-name", "and a long value".parse().unwrap());
        let err = channel.check_metadata_size(&large).unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_channel_service_poll_ready() {
        use tower_service::Service;

        let mut channel = Channel::builder("http://localhost:8080").build().unwrap();
        futures::future::poll_fn(|cx| {
            Service::<Request<TransportBody>>::poll_ready(&mut channel, cx)
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_clones_share_stats() {
        let channel = Channel::builder("http://localhost:8080").build().unwrap();
        let clone = channel.clone();

        channel
            .metrics
            .calls_started
            .fetch_add(1, Ordering::Relaxed);
        assert_eq!(clone.stats().calls_started, 1);
    }
}

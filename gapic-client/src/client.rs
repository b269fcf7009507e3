//! Generic call engine.
//!
//! [`Client`] executes RPCs described by [`MethodDescriptor`]s over a
//! [`Channel`]. Service bindings are data, not code: a binding declares one
//! descriptor constant per method and calls the engine's [`unary`],
//! [`server_streaming`], or [`paged`] entry points with its request and
//! response types. The engine handles everything between, from option
//! resolution and retries down to envelope decoding.
//!
//! [`unary`]: Client::unary
//! [`server_streaming`]: Client::server_streaming
//! [`paged`]: Client::paged
//!
//! # Call anatomy
//!
//! Every call goes through the same stages:
//!
//! 1. Resolve options: per-call options beat the method's service-config
//!    entry, which beats the client-wide defaults, which beat the
//!    service-wide defaults and the built-ins. Each option resolves
//!    independently.
//! 2. Encode the request message once.
//! 3. Stamp a request id that stays stable across every retry attempt.
//! 4. Run attempts under the retry policy until success, a non-retryable
//!    error, the attempt budget, or the overall deadline.
//! 5. Decode the response and hand back message plus metadata.

use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use prost::Message;
use tokio::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{Instrument, info_span};

use crate::builder::ClientBuilder;
use crate::config::retry::{self, RetryPolicy};
use crate::config::{CallOptions, defaults};
use crate::error::ClientError;
use crate::error_parser::parse_error_body;
use crate::method::{MethodDescriptor, ServiceConfig};
use crate::paging::{PageableRequest, PageableResponse, Pager};
use crate::response::decoder::FrameDecoder;
use crate::response::{Metadata, Response};
use crate::streaming::{ServerStream, body_to_stream};
use crate::transport::{Channel, REQUEST_ID_HEADER, new_request_id};

/// Generic RPC client.
///
/// Cheap to clone; clones share the channel's connection pool.
///
/// # Example
///
/// ```ignore
/// use gapic_client::{Client, Idempotency, MethodDescriptor};
///
/// const GET_INSTANCE: MethodDescriptor = MethodDescriptor::new(
///     "example.v1.InstanceAdmin/GetInstance",
///     Idempotency::Idempotent,
/// );
///
/// let client = Client::builder("https://example.googleapis.com").build()?;
/// let response = client
///     .unary::<GetInstanceRequest, Instance>(&GET_INSTANCE, &request)
///     .await?;
/// println!("instance: {:?}", response.get_ref());
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    channel: Channel,
    service_config: ServiceConfig,
    default_options: CallOptions,
}

/// Options for one call with every layer applied.
struct ResolvedOptions {
    timeout: Duration,
    retry: RetryPolicy,
    metadata: HeaderMap,
}

impl Client {
    /// Create a builder for a client against the given endpoint.
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    pub(crate) fn from_parts(
        channel: Channel,
        service_config: ServiceConfig,
        default_options: CallOptions,
    ) -> Self {
        Self {
            channel,
            service_config,
            default_options,
        }
    }

    /// The channel this client sends calls over.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The per-service call defaults installed at build time.
    pub fn service_config(&self) -> &ServiceConfig {
        &self.service_config
    }

    /// The client-wide call defaults installed at build time.
    pub fn default_options(&self) -> &CallOptions {
        &self.default_options
    }

    /// Resolve the effective options for one call.
    ///
    /// Per-call beats the method's service-config entry, which beats the
    /// client-wide defaults, which beat the service-wide defaults and the
    /// built-ins. Resolution is per option: a per-call timeout never masks
    /// a retry policy configured further down.
    fn resolve_options(&self, method: &MethodDescriptor, options: CallOptions) -> ResolvedOptions {
        let mut merged = options;
        if let Some(overrides) = self.service_config.method_options(method) {
            merged = merged.merge_defaults(overrides);
        }
        let merged = merged
            .merge_defaults(&self.default_options)
            .merge_defaults(&self.service_config.defaults);

        ResolvedOptions {
            timeout: merged.timeout.unwrap_or(defaults::TIMEOUT),
            retry: merged.retry_policy.unwrap_or_default(),
            metadata: merged.metadata,
        }
    }

    /// Make a unary call.
    ///
    /// Sends `request` to the method and decodes the single response.
    /// Options resolve from the client's configuration; use
    /// [`unary_with_options`](Self::unary_with_options) for per-call
    /// overrides.
    pub async fn unary<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
    ) -> Result<Response<Res>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        self.unary_with_options(method, request, CallOptions::new())
            .await
    }

    /// Make a unary call with per-call options.
    ///
    /// Transient failures are retried per the resolved retry policy, within
    /// the resolved deadline, as long as the method's idempotency allows.
    /// The error that finally fails a call is the terminal attempt's error,
    /// exactly as the server or transport produced it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use std::time::Duration;
    /// use gapic_client::CallOptions;
    ///
    /// let options = CallOptions::new()
    ///     .timeout(Duration::from_secs(5))
    ///     .header("x-goog-request-params", "parent=projects/demo");
    ///
    /// let response = client
    ///     .unary_with_options::<ListZonesRequest, ListZonesResponse>(
    ///         &LIST_ZONES, &request, options,
    ///     )
    ///     .await?;
    /// ```
    pub async fn unary_with_options<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
        options: CallOptions,
    ) -> Result<Response<Res>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let call = self.unary_inner(method, request, options);
        #[cfg(feature = "tracing")]
        let call = call.instrument(info_span!(
            "rpc.call",
            rpc.method = %method.path,
            rpc.type = "unary",
            otel.kind = "client",
        ));
        call.await
    }

    async fn unary_inner<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
        options: CallOptions,
    ) -> Result<Response<Res>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        // 1. Resolve effective options for this method
        let resolved = self.resolve_options(method, options);

        // 2. Encode the request once; retries resend the same bytes
        let body = encode_message(request);

        // 3. One request id spans every attempt of this call
        let mut metadata = resolved.metadata;
        if !metadata.contains_key(REQUEST_ID_HEADER) {
            metadata.insert(REQUEST_ID_HEADER, new_request_id().parse().unwrap());
        }

        // 4. Overall deadline, shared by the attempts and the backoff sleeps
        let deadline = Instant::now() + resolved.timeout;

        // 5. Run attempts under the retry policy
        let metadata = &metadata;
        retry::execute(
            &resolved.retry,
            method.idempotency,
            Some(deadline),
            |_attempt| {
                let body = body.clone();
                async move {
                    let remaining = deadline
                        .checked_duration_since(Instant::now())
                        .ok_or_else(|| ClientError::deadline_exceeded("call deadline exhausted"))?;
                    let response = self
                        .channel
                        .invoke_unary(method.path, body, Some(remaining), metadata)
                        .await?;
                    decode_unary_response(response)
                }
            },
        )
        .await
    }

    /// Make a server-streaming call.
    ///
    /// Sends `request` and returns a [`ServerStream`] of response messages.
    /// The response metadata comes from the initial response headers;
    /// trailers become available on the stream once it ends.
    pub async fn server_streaming<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
    ) -> Result<Response<ServerStream<Res>>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        self.server_streaming_with_options(method, request, CallOptions::new())
            .await
    }

    /// Make a server-streaming call with per-call options.
    ///
    /// The retry policy covers opening the stream; once messages are
    /// flowing, failures surface through the stream and are not retried.
    /// The resolved deadline bounds the opening phase on the client side
    /// and travels to the server as the timeout header, which the server
    /// applies to the stream's whole lifetime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::StreamExt;
    ///
    /// let response = client
    ///     .server_streaming::<WatchRequest, WatchEvent>(&WATCH, &request)
    ///     .await?;
    /// let mut events = response.into_inner();
    ///
    /// while let Some(event) = events.next().await {
    ///     handle(event?);
    /// }
    /// ```
    pub async fn server_streaming_with_options<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
        options: CallOptions,
    ) -> Result<Response<ServerStream<Res>>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let call = self.streaming_inner(method, request, options);
        #[cfg(feature = "tracing")]
        let call = call.instrument(info_span!(
            "rpc.call",
            rpc.method = %method.path,
            rpc.type = "server_stream",
            otel.kind = "client",
        ));
        call.await
    }

    async fn streaming_inner<Req, Res>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
        options: CallOptions,
    ) -> Result<Response<ServerStream<Res>>, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        // 1. Resolve effective options for this method
        let resolved = self.resolve_options(method, options);

        // 2. Encode the request once; retries resend the same bytes
        let body = encode_message(request);

        // 3. One request id spans every attempt of this call
        let mut metadata = resolved.metadata;
        if !metadata.contains_key(REQUEST_ID_HEADER) {
            metadata.insert(REQUEST_ID_HEADER, new_request_id().parse().unwrap());
        }

        // 4. Overall deadline for opening the stream
        let deadline = Instant::now() + resolved.timeout;

        // 5. Retry covers opening the stream, not the stream itself
        let metadata_ref = &metadata;
        let response = retry::execute(
            &resolved.retry,
            method.idempotency,
            Some(deadline),
            |_attempt| {
                let body = body.clone();
                async move {
                    let remaining = deadline
                        .checked_duration_since(Instant::now())
                        .ok_or_else(|| ClientError::deadline_exceeded("call deadline exhausted"))?;
                    let response = self
                        .channel
                        .invoke_streaming(method.path, body, Some(remaining), metadata_ref)
                        .await?;
                    check_stream_response(response).await
                }
            },
        )
        .await?;

        // 6. Frame-decode the body into a message stream
        let (parts, body) = response.into_parts();
        let decoder = FrameDecoder::new(
            body_to_stream(body),
            self.channel.args().max_receive_message_length,
        );

        Ok(Response::new(
            ServerStream::new(decoder),
            Metadata::new(parts.headers),
        ))
    }

    /// Iterate a list method page by page.
    ///
    /// Nothing is sent until the pager's first fetch. Each page fetch is a
    /// full unary call, with the same option resolution and retries.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut pager = client.paged::<ListInstancesRequest, ListInstancesResponse>(
    ///     &LIST_INSTANCES,
    ///     request,
    /// );
    ///
    /// let instances = pager.all_items().await?;
    /// ```
    pub fn paged<'a, Req, Res>(
        &'a self,
        method: &MethodDescriptor,
        request: Req,
    ) -> Pager<'a, Req, Res>
    where
        Req: Message + PageableRequest + Send + Sync + 'a,
        Res: Message + PageableResponse + Default + Send,
    {
        self.paged_with_options(method, request, CallOptions::new())
    }

    /// Iterate a list method page by page, with per-call options.
    ///
    /// The options apply to every page fetch.
    pub fn paged_with_options<'a, Req, Res>(
        &'a self,
        method: &MethodDescriptor,
        request: Req,
        options: CallOptions,
    ) -> Pager<'a, Req, Res>
    where
        Req: Message + PageableRequest + Send + Sync + 'a,
        Res: Message + PageableResponse + Default + Send,
    {
        let method = *method;
        Pager::new(request, move |req: Req| {
            let options = options.clone();
            Box::pin(async move { self.unary_with_options(&method, &req, options).await })
        })
    }
}

/// Encode a request message to its wire bytes.
fn encode_message<T: Message>(message: &T) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

/// Turn a collected unary response into a decoded message, or the error the
/// server sent.
fn decode_unary_response<Res>(response: http::Response<Bytes>) -> Result<Response<Res>, ClientError>
where
    Res: Message + Default,
{
    let (parts, body) = response.into_parts();

    if !parts.status.is_success() {
        return Err(parse_error_body(parts.status, &body));
    }

    let message = Res::decode(body)
        .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e)))?;

    Ok(Response::new(message, Metadata::new(parts.headers)))
}

/// Pass a successfully opened stream through, or read out the error body of
/// a failed open.
async fn check_stream_response(
    response: http::Response<Incoming>,
) -> Result<http::Response<Incoming>, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ClientError::Transport(format!("failed to read error body: {}", e)))?
        .to_bytes();
    Err(parse_error_body(status, &body))
}

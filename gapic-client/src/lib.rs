//! Typed, resilient RPC client runtime for cloud APIs.
//!
//! This crate is the hand-written half of a generated-client system: service
//! bindings declare *what* their methods are, and this runtime supplies *how*
//! they are called. One engine handles channel pooling, credentials,
//! deadlines, retries with exponential backoff, pagination, and server
//! streaming for every service built on top of it.
//!
//! ## Services Are Data
//!
//! A service binding is a table of [`MethodDescriptor`] constants plus thin
//! typed wrappers around the engine's entry points. No per-service networking
//! code is generated; adding a method means adding a row.
//!
//! ```ignore
//! use gapic_client::{Client, ClientError, Idempotency, MethodDescriptor, Response};
//!
//! const GET_TABLE: MethodDescriptor = MethodDescriptor::new(
//!     "google.bigtable.admin.v2.BigtableTableAdmin/GetTable",
//!     Idempotency::Idempotent,
//! );
//!
//! const CREATE_TABLE: MethodDescriptor = MethodDescriptor::new(
//!     "google.bigtable.admin.v2.BigtableTableAdmin/CreateTable",
//!     Idempotency::NonIdempotent,
//! );
//!
//! pub struct TableAdminClient {
//!     inner: Client,
//! }
//!
//! impl TableAdminClient {
//!     pub async fn get_table(&self, req: &GetTableRequest) -> Result<Response<Table>, ClientError> {
//!         self.inner.unary(&GET_TABLE, req).await
//!     }
//! }
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use gapic_client::{Client, Credentials};
//!
//! let client = Client::builder("https://bigtableadmin.googleapis.com")
//!     .credentials(Credentials::bearer(token)?)
//!     .build()?;
//!
//! let response = client
//!     .unary::<GetTableRequest, Table>(&GET_TABLE, &request)
//!     .await?;
//!
//! println!("table: {:?}", response.into_inner());
//! ```
//!
//! ## Server Streaming Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let response = client
//!     .server_streaming::<ReadRowsRequest, ReadRowsResponse>(&READ_ROWS, &request)
//!     .await?;
//!
//! let mut stream = response.into_inner();
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(chunk) => handle(chunk),
//!         Err(e) => return Err(e),
//!     }
//! }
//!
//! // Trailing metadata becomes available once the stream ends
//! if let Some(trailers) = stream.trailers() {
//!     println!("trailers: {:?}", trailers);
//! }
//! ```
//!
//! ## Streaming Cancellation
//!
//! A [`ServerStream`] can be cancelled three ways:
//!
//! ### Calling `cancel()`
//!
//! [`ServerStream::cancel`] tears down the underlying HTTP/2 stream
//! (RST_STREAM) and leaves the stream in a terminal state. The next poll
//! yields exactly one [`ClientError::StreamClosed`], then the stream is
//! over. Calling `cancel` again is a no-op.
//!
//! ```ignore
//! let mut stream = response.into_inner();
//!
//! for _ in 0..5 {
//!     if let Some(Ok(row)) = stream.next().await {
//!         process(row);
//!     }
//! }
//!
//! stream.cancel();
//! assert!(matches!(stream.next().await, Some(Err(e)) if e.code() == Code::Canceled));
//! assert!(stream.next().await.is_none());
//! ```
//!
//! ### Dropping the Stream
//!
//! Dropping a [`ServerStream`] closes the HTTP/2 stream the same way,
//! without the terminal signal (there is nobody left to observe one).
//!
//! ### Racing With `tokio::select!`
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => {
//!             stream.cancel();
//!             break;
//!         }
//!         item = stream.next() => match item {
//!             Some(Ok(row)) => process(row),
//!             Some(Err(e)) => return Err(e),
//!             None => break,
//!         }
//!     }
//! }
//! ```
//!
//! ### Graceful Shutdown
//!
//! Abrupt teardown wastes the pooled connection. To finish a stream while
//! keeping the connection reusable, use [`ServerStream::drain`] or
//! [`ServerStream::drain_timeout`], which read and discard the remaining
//! messages instead of resetting the stream.
//!
//! ## Retries
//!
//! Every call runs under a [`RetryPolicy`]: which status codes to retry,
//! how many attempts to make, and how to back off between them. Delays
//! follow the gRPC connection backoff scheme, `initial_backoff *
//! multiplier^(attempt - 1)` capped at `max_backoff`, with random jitter.
//!
//! ```ignore
//! use std::time::Duration;
//! use gapic_client::{CallOptions, RetryPolicy};
//! use gapic_core::Code;
//!
//! let policy = RetryPolicy::new()
//!     .max_attempts(6)
//!     .initial_backoff(Duration::from_millis(100))
//!     .max_backoff(Duration::from_secs(30))
//!     .retryable_codes(&[Code::Unavailable, Code::Aborted]);
//!
//! let response = client
//!     .unary_with_options::<Req, Res>(
//!         &GET_TABLE,
//!         &request,
//!         CallOptions::new().retry_policy(policy),
//!     )
//!     .await?;
//! ```
//!
//! Two rules hold regardless of policy:
//!
//! - Methods declared [`Idempotency::NonIdempotent`] are never retried
//!   unless the policy opts in with
//!   [`retry_non_idempotent`](RetryPolicy::retry_non_idempotent). A create
//!   that times out may still have happened; retrying it is a decision,
//!   not a default.
//! - The error that ends a call is the terminal attempt's error, exactly as
//!   produced. Retry bookkeeping never wraps or replaces it.
//!
//! All attempts of one call share a single request id (the `x-request-id`
//! header), so server logs can correlate retries.
//!
//! ## Configuration Resolution
//!
//! Call options resolve through layers, highest priority first:
//!
//! 1. Per-call [`CallOptions`]
//! 2. The method's [`ServiceConfig`] entry
//! 3. Client-wide defaults ([`ClientBuilder::default_options`])
//! 4. Service-wide [`ServiceConfig`] defaults
//! 5. Built-in defaults
//!
//! Each option resolves independently: a per-call timeout does not mask a
//! retry policy configured at the client level. Unknown channel argument
//! names are rejected when set ([`ChannelArgs::set`]), never deferred to
//! call time.
//!
//! ## Pagination
//!
//! List methods return a [`Pager`] that fetches pages lazily, one unary
//! call per page, until the server returns an empty page token.
//!
//! ```ignore
//! let mut pager = client.paged::<ListTablesRequest, ListTablesResponse>(
//!     &LIST_TABLES,
//!     request,
//! );
//!
//! while let Some(page) = pager.next_page().await {
//!     for table in page?.into_inner().into_items() {
//!         println!("{}", table.name);
//!     }
//! }
//! ```
//!
//! [`Pager::all_items`] collects everything in one call;
//! [`Pager::into_item_stream`] adapts the pager into a `Stream` of items;
//! [`Pager::restart`] rewinds to the first page.
//!
//! ## Resource Names
//!
//! Resource names embedded in requests follow path templates, re-exported
//! from `gapic-core`:
//!
//! ```ignore
//! use gapic_client::PathTemplate;
//!
//! let template = PathTemplate::new("projects/{project}/instances/{instance=*}")?;
//! let name = template.render(&[("project", "demo"), ("instance", "main")])?;
//! let bindings = template.parse("projects/demo/instances/main")?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `tls` | yes | TLS via rustls with the ring provider and native roots |
//! | `tls-aws-lc` | no | rustls with the aws-lc-rs provider instead of ring |
//! | `tls-native-roots` | no | Trust the platform certificate store |
//! | `tls-webpki-roots` | no | Trust the bundled webpki root set |
//! | `tracing` | no | Tracing spans for RPC calls |
//!
//! With `tracing` enabled, each call creates a span carrying:
//! - `rpc.method`: full method path (e.g. "package.Service/Method")
//! - `rpc.type`: "unary" or "server_stream"
//! - `otel.kind`: "client"
//!
//! ## Wire Format
//!
//! - **Unary**: HTTP POST with a protobuf body; errors are a JSON body
//!   `{"error": {"code": "...", "message": "..."}}` with a mapped HTTP
//!   status.
//! - **Streaming**: enveloped messages with a 5-byte header
//!   `[flags:1][length:4]`; the final envelope sets flags `0x02` and holds
//!   JSON with optional error and metadata.
//! - **Deadlines**: travel to the server as the `x-timeout-ms` header.
//!
//! ## TLS Configuration
//!
//! `https` endpoints use rustls with roots per the enabled features. For
//! custom roots or mTLS, pass a pre-built [`TlsClientConfig`]:
//!
//! ```ignore
//! let mut roots = rustls::RootCertStore::empty();
//! roots.add(ca_cert)?;
//! let tls = rustls::ClientConfig::builder()
//!     .with_root_certificates(roots)
//!     .with_no_client_auth();
//!
//! let client = Client::builder("https://internal-service:443")
//!     .tls_config(tls)
//!     .build()?;
//! ```
//!
//! Several clients can share one connection pool by building a [`Channel`]
//! once and handing it to each [`ClientBuilder::channel`].

mod builder;
mod client;
pub mod config;
mod credentials;
mod error;
mod error_parser;
mod method;
pub mod paging;
pub mod response;
pub mod streaming;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::Client;
pub use credentials::Credentials;
pub use error::ClientError;

// Re-export from config module
pub use config::retry::{ExponentialBackoff, RetryPolicy};
pub use config::{CallOptions, ChannelArgs, ConfigError};

// Re-export from method module
pub use method::{Idempotency, MethodDescriptor, ServiceConfig};

// Re-export from paging module
pub use paging::{PageableRequest, PageableResponse, Pager};

// Re-export from response module
pub use response::decoder::FrameDecoder;
pub use response::{Metadata, Response};

// Re-export from streaming module
pub use streaming::ServerStream;

// Re-export transport types at the top level for convenience
pub use transport::{Channel, ChannelBuilder, ChannelStats, TlsClientConfig, TransportBody};

// Re-export core types that users need
pub use gapic_core::{Code, PathError, PathTemplate, PathTemplateSet, Status};

// Re-export types needed when driving a channel directly
pub use bytes::Bytes;

//! HTTP/2 transport layer for the RPC client.
//!
//! This module provides the [`Channel`] type, a pooled connection to a single
//! service endpoint built on hyper_util's legacy client. It supports:
//!
//! - HTTP/2 with connection multiplexing (multiple in-flight calls share one
//!   connection) and automatic reconnection through the pool
//! - TLS with rustls (feature-gated)
//! - Message-size and metadata-size limits from [`ChannelArgs`]
//! - Tower service integration for middleware
//!
//! [`ChannelArgs`]: crate::config::ChannelArgs
//!
//! # Feature Flags
//!
//! TLS support requires enabling the appropriate features:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates
//!
//! # Example
//!
//! ```ignore
//! use gapic_client::transport::Channel;
//! use std::time::Duration;
//!
//! // Create with default settings (uses default TLS if features enabled)
//! let channel = Channel::builder("https://example.googleapis.com").build()?;
//!
//! // Or customize pooling
//! let channel = Channel::builder("https://example.googleapis.com")
//!     .pool_idle_timeout(Duration::from_secs(60))
//!     .build()?;
//! ```

mod body;
mod channel;
mod connector;

pub use body::TransportBody;
pub use channel::{Channel, ChannelBuilder, ChannelStats};
pub(crate) use channel::{REQUEST_ID_HEADER, new_request_id};
pub use connector::{build_http_connector, build_https_connector, has_tls_support};

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
pub use connector::default_tls_config;

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

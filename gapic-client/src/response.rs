//! Response types for RPC calls.
//!
//! This module provides the [`Response`] type which wraps a decoded message
//! along with [`Metadata`] (headers) from the server.

pub mod decoder;

use base64::Engine;
use http::HeaderMap;
use std::ops::Deref;

/// Response wrapper for RPC calls.
///
/// Contains the response message and associated metadata (HTTP headers)
/// from the server response.
///
/// # Example
///
/// ```ignore
/// let response = client.unary::<Req, Res>(&GET_ITEM, request).await?;
///
/// // Access the response directly via Deref
/// println!("Name: {}", response.name);
///
/// // Or extract the inner value
/// let inner = response.into_inner();
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The response message.
    inner: T,
    /// Response metadata (HTTP headers).
    metadata: Metadata,
}

impl<T> Response<T> {
    /// Create a new Response with the given value and metadata.
    pub fn new(inner: T, metadata: Metadata) -> Self {
        Self { inner, metadata }
    }

    /// Extract the inner value, discarding metadata.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Get a reference to the response metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the response metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Transform the inner value, preserving metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            inner: f(self.inner),
            metadata: self.metadata,
        }
    }

    /// Get a reference to the inner value.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Get a mutable reference to the inner value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Decompose into inner value and metadata.
    pub fn into_parts(self) -> (T, Metadata) {
        (self.inner, self.metadata)
    }
}

impl<T> Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

/// Response metadata wrapper around HTTP headers.
///
/// Provides convenient access to response headers and trailers returned by
/// the server. Names ending in `-bin` carry base64-encoded binary values;
/// use [`get_bin`](Metadata::get_bin) for those.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create new metadata from HTTP headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Create empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a header value by name.
    ///
    /// Returns `None` if the header is not present or cannot be converted to a string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Get a header value as raw bytes.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.headers.get(key).map(|v| v.as_bytes())
    }

    /// Decode a binary-valued header (a name ending in `-bin`).
    ///
    /// Binary metadata is transported base64-encoded; values are accepted
    /// with or without padding.
    pub fn get_bin(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.headers.get(key)?;
        base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(value.as_bytes())
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value.as_bytes()))
            .ok()
    }

    /// Check if a header exists.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Get all values for a header (for headers that appear multiple times).
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Get the underlying HeaderMap.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the underlying HeaderMap.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Consume self and return the underlying HeaderMap.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Get an iterator over all header names and values.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&http::header::HeaderName, &http::header::HeaderValue)> {
        self.headers.iter()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl From<Metadata> for HeaderMap {
    fn from(metadata: Metadata) -> Self {
        metadata.headers
    }
}

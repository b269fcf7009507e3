//! Streaming response wrapper for server-streaming calls.
//!
//! This module provides [`ServerStream`], a wrapper around streaming response
//! bodies that supports explicit cancellation and provides access to trailers
//! after the stream is consumed.
//!
//! # Cancellation
//!
//! Calling [`ServerStream::cancel`] releases the underlying HTTP connection,
//! which signals cancellation to the server via an HTTP/2 RST_STREAM frame.
//! After cancellation the stream reports a single [`ClientError::StreamClosed`]
//! and then ends; repeated cancellation has no further effect. Dropping a
//! [`ServerStream`] without cancelling has the same effect on the connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::ClientError;
use crate::response::Metadata;
use crate::response::decoder::FrameDecoder;

/// Byte stream over a streamed response body.
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Convert a hyper Incoming body to a stream of bytes with ClientError.
pub(crate) fn body_to_stream(body: hyper::body::Incoming) -> ByteStream {
    use http_body_util::BodyExt;

    Box::pin(
        futures::stream::unfold(body, |mut body| async move {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        Some((Ok(data), body))
                    } else {
                        // Trailers or other frame types - skip
                        Some((Ok(Bytes::new()), body))
                    }
                }
                Some(Err(e)) => Some((
                    Err(ClientError::Transport(format!("stream error: {}", e))),
                    body,
                )),
                None => None,
            }
        })
        .filter(|result| {
            // Filter out empty chunks
            futures::future::ready(match result {
                Ok(bytes) => !bytes.is_empty(),
                Err(_) => true,
            })
        }),
    )
}

/// Wrapper for streaming response messages.
///
/// `ServerStream<T>` decodes envelope frames from the response body and yields
/// messages of type `T` until the server ends the stream or the caller cancels.
///
/// # Example
///
/// ```ignore
/// let response = client.server_streaming::<Req, Res>(&WATCH_ITEMS, request).await?;
/// let mut stream = response.into_inner();
///
/// while let Some(result) = stream.next().await {
///     match result {
///         Ok(msg) => println!("Got message: {:?}", msg),
///         Err(e) => eprintln!("Error: {:?}", e),
///     }
/// }
///
/// // After the stream is consumed, trailers are available
/// if let Some(trailers) = stream.trailers() {
///     println!("Trailers: {:?}", trailers);
/// }
/// ```
pub struct ServerStream<T> {
    /// The frame decoder, dropped on cancellation to release the connection.
    decoder: Option<FrameDecoder<ByteStream, T>>,
    /// Trailers salvaged from the decoder at cancellation time.
    trailers: Option<Metadata>,
    /// Whether the post-cancel closed signal has been yielded.
    cancel_reported: bool,
}

impl<T> std::fmt::Debug for ServerStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStream")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .field("trailers", &self.trailers)
            .finish()
    }
}

impl<T> ServerStream<T> {
    /// Create a new ServerStream over a frame decoder.
    pub(crate) fn new(decoder: FrameDecoder<ByteStream, T>) -> Self {
        Self {
            decoder: Some(decoder),
            trailers: None,
            cancel_reported: false,
        }
    }

    /// Cancel the stream.
    ///
    /// Releases the underlying connection immediately; the server observes an
    /// HTTP/2 stream reset. The next poll yields a single
    /// [`ClientError::StreamClosed`], after which the stream ends. Calling
    /// this more than once has no further effect, and no additional closed
    /// signals are produced.
    ///
    /// Trailers already received before cancellation remain available via
    /// [`trailers()`](Self::trailers).
    pub fn cancel(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            self.trailers = decoder.take_trailers();
        }
    }

    /// Check if the stream has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.decoder.is_none()
    }

    /// Get the trailers received in the end-of-stream frame.
    ///
    /// Returns `None` if the stream hasn't finished or if no trailers were sent.
    ///
    /// Note: Trailers are only available after the stream has been fully consumed.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.trailers
            .as_ref()
            .or_else(|| self.decoder.as_ref().and_then(|d| d.trailers()))
    }

    /// Take the trailers, leaving `None` in place.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        self.trailers
            .take()
            .or_else(|| self.decoder.as_mut().and_then(|d| d.take_trailers()))
    }

    /// Check if the stream has finished.
    ///
    /// A stream is finished once the end-of-stream frame arrived, a fatal
    /// decoding error occurred, or the stream was cancelled.
    pub fn is_finished(&self) -> bool {
        self.decoder.as_ref().is_none_or(|d| d.is_finished())
    }
}

/// Graceful shutdown methods for streaming responses.
impl<T> ServerStream<T>
where
    T: prost::Message + Default,
{
    /// Gracefully drain all remaining messages from the stream.
    ///
    /// This method consumes all remaining messages without processing them,
    /// allowing for graceful connection cleanup and reuse. After draining,
    /// trailers will be available via [`trailers()`](Self::trailers).
    ///
    /// Returns the number of messages that were drained (not including errors).
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut stream = response.into_inner();
    ///
    /// // Process some messages, then stop early
    /// while let Some(Ok(msg)) = stream.next().await {
    ///     if should_stop(&msg) {
    ///         break;
    ///     }
    ///     process(msg);
    /// }
    ///
    /// // Gracefully drain remaining messages
    /// let drained = stream.drain().await;
    /// println!("Drained {} remaining messages", drained);
    /// ```
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Gracefully drain remaining messages with a timeout.
    ///
    /// Like [`drain()`](Self::drain), but returns early if the timeout expires.
    /// This prevents hanging indefinitely on slow or stuck streams.
    ///
    /// Returns `Ok(count)` if the stream was fully drained, or `Err(count)`
    /// if the timeout expired (where `count` is the number of messages drained
    /// before the timeout).
    pub async fn drain_timeout(&mut self, timeout: std::time::Duration) -> Result<usize, usize> {
        let mut count = 0;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(count);
                }

                item = self.next() => {
                    match item {
                        Some(Ok(_)) => count += 1,
                        Some(Err(_)) => {}
                        None => return Ok(count),
                    }
                }
            }
        }
    }
}

impl<T> Unpin for ServerStream<T> {}

impl<T> Stream for ServerStream<T>
where
    T: prost::Message + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.decoder.as_mut() {
            Some(decoder) => Pin::new(decoder).poll_next(cx),
            // Cancelled: one closed signal, then the stream ends
            None if this.cancel_reported => Poll::Ready(None),
            None => {
                this.cancel_reported = true;
                Poll::Ready(Some(Err(ClientError::StreamClosed)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.decoder {
            Some(_) => (0, None),
            None if self.cancel_reported => (0, Some(0)),
            None => (1, Some(1)),
        }
    }
}

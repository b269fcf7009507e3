//! Streaming envelope decoding.
//!
//! This module provides [`FrameDecoder`]: a stream adapter that parses
//! length-prefixed envelopes from a byte stream and yields decoded messages.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use gapic_core::{
    Code, ENVELOPE_HEADER_SIZE, EnvelopeError, envelope_flags, parse_envelope_header,
};

use crate::ClientError;
use crate::response::Metadata;
use futures::Stream;
use prost::Message;
use serde::Deserialize;

/// Decoded streaming frame result.
enum DecodedFrame<T> {
    /// A message frame containing a decoded message.
    Message(T),
    /// End of stream (trailers are stored in the decoder).
    EndStream,
}

/// Stream adapter that decodes envelope frames into messages.
///
/// Wraps a byte stream (the raw response body) and yields decoded protobuf
/// messages until the end-of-stream envelope arrives.
///
/// # Frame Format
///
/// Streamed responses use envelope framing:
/// ```text
/// [flags:1][length:4][payload:length]
/// ```
///
/// Flags:
/// - `0x00`: Message
/// - `0x02`: End of stream, payload carries status and trailers as JSON
///
/// Frames whose declared payload exceeds the configured receive limit are
/// rejected without buffering the payload.
///
/// # Example
///
/// ```ignore
/// let stream = body_to_stream(response.into_body());
/// let mut decoder = FrameDecoder::<_, MyMessage>::new(stream, None);
///
/// while let Some(result) = decoder.next().await {
///     let msg = result?;
///     println!("Got message: {:?}", msg);
/// }
/// ```
pub struct FrameDecoder<S, T> {
    /// The underlying byte stream.
    stream: S,
    /// Buffer for incomplete frames.
    buffer: BytesMut,
    /// Per-message receive limit in bytes, if configured.
    max_message_size: Option<usize>,
    /// Stored trailers from the end-of-stream frame.
    trailers: Option<Metadata>,
    /// Whether the stream has finished (received end-of-stream or error).
    finished: bool,
    /// Error from the end-of-stream frame, if any.
    end_stream_error: Option<ClientError>,
    /// Type marker for the message type.
    _marker: PhantomData<T>,
}

impl<S, T> FrameDecoder<S, T> {
    /// Create a new frame decoder.
    ///
    /// # Arguments
    ///
    /// * `stream` - The underlying byte stream
    /// * `max_message_size` - Per-message receive limit, `None` for unlimited
    pub fn new(stream: S, max_message_size: Option<usize>) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            max_message_size,
            trailers: None,
            finished: false,
            end_stream_error: None,
            _marker: PhantomData,
        }
    }

    /// Get the trailers received in the end-of-stream frame.
    ///
    /// Returns `None` if the stream hasn't finished or if no trailers were sent.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.trailers.as_ref()
    }

    /// Take the trailers, leaving `None` in place.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        self.trailers.take()
    }

    /// Check if the stream has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Try to parse a complete frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if there was a parsing error
    fn try_parse_frame(&mut self) -> Result<Option<DecodedFrame<T>>, ClientError>
    where
        T: Message + Default,
    {
        // Need at least the header
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        // Parse header
        let (flags, length) = parse_envelope_header(&self.buffer)?;

        // Reject oversized frames before buffering the payload
        if let Some(limit) = self.max_message_size
            && length as usize > limit
        {
            return Err(EnvelopeError::Oversize {
                actual: length as usize,
                limit,
            }
            .into());
        }

        let frame_size = ENVELOPE_HEADER_SIZE + length as usize;

        // Check if we have the complete frame
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        // Extract frame bytes
        let frame_bytes = self.buffer.split_to(frame_size);
        let payload = Bytes::copy_from_slice(&frame_bytes[ENVELOPE_HEADER_SIZE..]);

        // Check if this is an end-of-stream frame
        if flags == envelope_flags::END_STREAM {
            let (error, trailers) = parse_end_stream(&payload)?;

            // Store trailers
            self.trailers = trailers;
            self.finished = true;

            if let Some(err) = error {
                // Store error for next poll
                self.end_stream_error = Some(err);
            }

            return Ok(Some(DecodedFrame::EndStream));
        }

        // Decode message
        let message = T::decode(payload)
            .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e)))?;

        Ok(Some(DecodedFrame::Message(message)))
    }
}

impl<S, T> Unpin for FrameDecoder<S, T> where S: Unpin {}

impl<S, T> Stream for FrameDecoder<S, T>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
    T: Message + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Check for stored end-of-stream error
            if let Some(err) = this.end_stream_error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            // If finished, no more items
            if this.finished {
                return Poll::Ready(None);
            }

            // Try to parse a frame from the buffer
            match this.try_parse_frame() {
                Ok(Some(DecodedFrame::Message(msg))) => {
                    return Poll::Ready(Some(Ok(msg)));
                }
                Ok(Some(DecodedFrame::EndStream)) => {
                    // Check for error from the end-of-stream frame
                    if let Some(err) = this.end_stream_error.take() {
                        return Poll::Ready(Some(Err(err)));
                    }
                    // Successful end of stream
                    return Poll::Ready(None);
                }
                Ok(None) => {
                    // Need more data, poll the underlying stream
                }
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            // Poll the underlying stream for more data
            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                    // Loop back to try parsing again
                }
                Poll::Ready(Some(Err(e))) => {
                    // Preserve the original error, it already carries a code
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Stream ended without an end-of-stream frame
                    this.finished = true;
                    if !this.buffer.is_empty() {
                        return Poll::Ready(Some(Err(ClientError::new(
                            Code::DataLoss,
                            format!(
                                "stream ended with {} bytes of incomplete data",
                                this.buffer.len()
                            ),
                        ))));
                    }
                    return Poll::Ready(Some(Err(ClientError::new(
                        Code::DataLoss,
                        "stream ended without end-of-stream frame",
                    ))));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// End-of-stream frame JSON structure.
#[derive(Deserialize)]
struct EndStreamJson {
    #[serde(default)]
    error: Option<EndStreamError>,
    #[serde(default)]
    metadata: Option<std::collections::HashMap<String, Vec<String>>>,
}

/// Error structure in the end-of-stream frame.
#[derive(Deserialize)]
struct EndStreamError {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// Parse an end-of-stream frame payload.
///
/// Returns `(error, trailers)` where both are optional. The error's code and
/// message are taken from the payload as-is.
fn parse_end_stream(
    payload: &[u8],
) -> Result<(Option<ClientError>, Option<Metadata>), ClientError> {
    // Empty payload is valid (no error, no trailers)
    if payload.is_empty() || payload == b"{}" {
        return Ok((None, None));
    }

    let end_stream: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| ClientError::Decode(format!("invalid end-of-stream JSON: {}", e)))?;

    // Parse error if present
    let error = end_stream.error.map(|e| {
        let code = e.code.parse().unwrap_or(Code::Unknown);
        if let Some(msg) = e.message {
            ClientError::new(code, msg)
        } else {
            ClientError::from_code(code)
        }
    });

    // Parse trailers/metadata if present
    let trailers = end_stream.metadata.map(|meta| {
        let mut headers = http::HeaderMap::new();
        for (key, values) in meta {
            if let Ok(name) = http::header::HeaderName::try_from(&key) {
                for value in values {
                    if let Ok(hv) = http::header::HeaderValue::try_from(&value) {
                        headers.append(name.clone(), hv);
                    }
                }
            }
        }
        Metadata::new(headers)
    });

    Ok((error, trailers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use futures::stream;

    // Helper to create a frame
    fn make_frame(flags: u8, payload: &[u8]) -> Bytes {
        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.push(flags);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        Bytes::from(frame)
    }

    // A simple test message type
    #[derive(Clone, PartialEq, Default)]
    struct TestMessage {
        value: String,
    }

    impl TestMessage {
        fn new(value: &str) -> Self {
            Self {
                value: value.to_string(),
            }
        }
    }

    impl std::fmt::Debug for TestMessage {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TestMessage")
                .field("value", &self.value)
                .finish()
        }
    }

    impl prost::Message for TestMessage {
        fn encode_raw(&self, buf: &mut impl bytes::BufMut)
        where
            Self: Sized,
        {
            if !self.value.is_empty() {
                prost::encoding::string::encode(1, &self.value, buf);
            }
        }

        fn merge_field(
            &mut self,
            tag: u32,
            wire_type: prost::encoding::WireType,
            buf: &mut impl bytes::Buf,
            ctx: prost::encoding::DecodeContext,
        ) -> Result<(), prost::DecodeError>
        where
            Self: Sized,
        {
            if tag == 1 {
                prost::encoding::string::merge(wire_type, &mut self.value, buf, ctx)
            } else {
                prost::encoding::skip_field(wire_type, tag, buf, ctx)
            }
        }

        fn encoded_len(&self) -> usize {
            if self.value.is_empty() {
                0
            } else {
                prost::encoding::string::encoded_len(1, &self.value)
            }
        }

        fn clear(&mut self) {
            self.value.clear();
        }
    }

    fn message_frame(value: &str) -> Bytes {
        make_frame(0x00, &TestMessage::new(value).encode_to_vec())
    }

    #[tokio::test]
    async fn test_decode_single_message() {
        let frame = message_frame("hello");
        let end_frame = make_frame(0x02, b"{}");

        let mut all_data = frame.to_vec();
        all_data.extend_from_slice(&end_frame);

        let stream = stream::iter(vec![Ok::<_, ClientError>(Bytes::from(all_data))]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        // Should be done
        assert!(decoder.next().await.is_none());
        assert!(decoder.is_finished());
    }

    #[tokio::test]
    async fn test_decode_multiple_messages() {
        let frame1 = message_frame("one");
        let frame2 = message_frame("two");
        let end_frame = make_frame(0x02, b"{}");

        let mut all_data = frame1.to_vec();
        all_data.extend_from_slice(&frame2);
        all_data.extend_from_slice(&end_frame);

        let stream = stream::iter(vec![Ok::<_, ClientError>(Bytes::from(all_data))]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        let msg1 = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg1.value, "one");

        let msg2 = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg2.value, "two");

        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_with_error_in_end_stream() {
        let frame = message_frame("hello");
        let end_payload = br#"{"error":{"code":"internal","message":"test error"}}"#;
        let end_frame = make_frame(0x02, end_payload);

        let mut all_data = frame.to_vec();
        all_data.extend_from_slice(&end_frame);

        let stream = stream::iter(vec![Ok::<_, ClientError>(Bytes::from(all_data))]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        // First message should succeed
        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        // Next should be the error, with the server's message untouched
        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.status().unwrap().message(), Some("test error"));
    }

    #[tokio::test]
    async fn test_decode_with_trailers() {
        let frame = message_frame("hello");
        let end_payload = br#"{"metadata":{"x-custom":["value1","value2"]}}"#;
        let end_frame = make_frame(0x02, end_payload);

        let mut all_data = frame.to_vec();
        all_data.extend_from_slice(&end_frame);

        let stream = stream::iter(vec![Ok::<_, ClientError>(Bytes::from(all_data))]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        // Consume message
        let _ = decoder.next().await;

        // Stream should end
        assert!(decoder.next().await.is_none());

        // Check trailers
        let trailers = decoder.trailers().unwrap();
        let values: Vec<_> = trailers.get_all("x-custom").collect();
        assert_eq!(values, vec!["value1", "value2"]);
    }

    #[tokio::test]
    async fn test_chunked_data() {
        // Split a frame across multiple chunks
        let frame = message_frame("hello");
        let end_frame = make_frame(0x02, b"{}");

        let mut all_data = frame.to_vec();
        all_data.extend_from_slice(&end_frame);

        // Split into small chunks
        let chunk1 = Bytes::copy_from_slice(&all_data[..3]);
        let chunk2 = Bytes::copy_from_slice(&all_data[3..10]);
        let chunk3 = Bytes::copy_from_slice(&all_data[10..]);

        let stream = stream::iter(vec![Ok::<_, ClientError>(chunk1), Ok(chunk2), Ok(chunk3)]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let frame = message_frame("this payload is longer than the limit");

        let stream = stream::iter(vec![Ok::<_, ClientError>(frame)]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, Some(8));

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);

        // The decoder is done after a fatal error
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_incomplete_data_is_data_loss() {
        let frame = message_frame("hello");
        // Drop the last few bytes of the frame
        let truncated = Bytes::copy_from_slice(&frame[..frame.len() - 3]);

        let stream = stream::iter(vec![Ok::<_, ClientError>(truncated)]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DataLoss);
    }

    #[tokio::test]
    async fn test_missing_end_frame_is_data_loss() {
        let frame = message_frame("hello");

        let stream = stream::iter(vec![Ok::<_, ClientError>(frame)]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        // Message decodes fine
        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        // Clean stream end without the terminal frame is reported
        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DataLoss);
    }

    #[tokio::test]
    async fn test_transport_error_passthrough() {
        let frame = message_frame("hello");
        let stream = stream::iter(vec![
            Ok::<_, ClientError>(frame),
            Err(ClientError::Transport("connection reset".to_string())),
        ]);
        let mut decoder = FrameDecoder::<_, TestMessage>::new(stream, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        let err = decoder.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(decoder.next().await.is_none());
    }

    #[test]
    fn test_parse_end_stream_empty() {
        let (error, trailers) = parse_end_stream(b"{}").unwrap();
        assert!(error.is_none());
        assert!(trailers.is_none());
    }

    #[test]
    fn test_parse_end_stream_with_error() {
        let payload = br#"{"error":{"code":"not_found","message":"resource not found"}}"#;
        let (error, trailers) = parse_end_stream(payload).unwrap();

        let err = error.unwrap();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.status().unwrap().message(), Some("resource not found"));
        assert!(trailers.is_none());
    }

    #[test]
    fn test_parse_end_stream_with_metadata() {
        let payload = br#"{"metadata":{"x-request-id":["123"]}}"#;
        let (error, trailers) = parse_end_stream(payload).unwrap();

        assert!(error.is_none());
        let meta = trailers.unwrap();
        assert_eq!(meta.get("x-request-id"), Some("123"));
    }

    #[test]
    fn test_parse_end_stream_unknown_code() {
        let payload = br#"{"error":{"code":"made_up_code","message":"strange"}}"#;
        let (error, _) = parse_end_stream(payload).unwrap();
        assert_eq!(error.unwrap().code(), Code::Unknown);
    }

    #[test]
    fn test_parse_end_stream_invalid_json() {
        let err = parse_end_stream(b"not json").unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}

//! Length-prefixed envelope framing for streamed response bodies.
//!
//! Each message on a streamed call is wrapped in a 5-byte envelope:
//! a flags byte followed by the payload length as a big-endian u32.
//! A final envelope with the end-of-stream flag carries the terminal
//! status and trailing metadata instead of a message.

use crate::error::EnvelopeError;

/// Envelope flag values.
pub mod envelope_flags {
    /// A regular message payload.
    pub const MESSAGE: u8 = 0x00;
    /// The final envelope of the stream, carrying status and trailers.
    pub const END_STREAM: u8 = 0x02;
}

/// Size of the envelope header: 1 flags byte + 4 length bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Wrap a message payload in an envelope.
///
/// # Example
///
/// ```
/// use gapic_core::{wrap_envelope, ENVELOPE_HEADER_SIZE};
///
/// let framed = wrap_envelope(b"hello");
/// assert_eq!(framed.len(), ENVELOPE_HEADER_SIZE + 5);
/// assert_eq!(framed[0], 0x00);
/// ```
pub fn wrap_envelope(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    framed.push(envelope_flags::MESSAGE);
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Parse an envelope header, returning the flags and payload length.
///
/// Fails if fewer than [`ENVELOPE_HEADER_SIZE`] bytes are available or if
/// the flags byte is not a recognized value.
pub fn parse_envelope_header(buf: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if buf.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let flags = buf[0];
    if flags != envelope_flags::MESSAGE && flags != envelope_flags::END_STREAM {
        return Err(EnvelopeError::InvalidFlags(flags));
    }

    let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    Ok((flags, length))
}

/// Check whether the end-of-stream flag is set.
pub fn is_end_stream(flags: u8) -> bool {
    flags & envelope_flags::END_STREAM != 0
}

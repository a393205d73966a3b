//! STOMP frames for the WebSocket transport.
//!
//! Frames are [`iridium_stomp::Frame`] values. This module adds the client
//! frame constructors the transport sends and [`FrameCodec`], which runs
//! [`StompCodec`] over WebSocket message payloads.
//!
//! # Format
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! A `content-length` header, when present, delimits the body; otherwise the
//! body ends at the first NUL. Bare EOLs between frames are heart-beats and
//! are skipped.

// ============================================================================
// Imports
// ============================================================================

use bytes::BytesMut;
use iridium_stomp::{StompCodec, StompItem};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, Result};

pub use iridium_stomp::Frame;

// ============================================================================
// Commands
// ============================================================================

/// Client frame: open a STOMP session.
pub const CONNECT: &str = "CONNECT";
/// Server frame: session established.
pub const CONNECTED: &str = "CONNECTED";
/// Client frame: publish a message.
pub const SEND: &str = "SEND";
/// Client frame: start a subscription.
pub const SUBSCRIBE: &str = "SUBSCRIBE";
/// Client frame: end a subscription.
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
/// Client frame: close the session.
pub const DISCONNECT: &str = "DISCONNECT";
/// Server frame: message for a subscription.
pub const MESSAGE: &str = "MESSAGE";
/// Server frame: receipt for a client frame.
pub const RECEIPT: &str = "RECEIPT";
/// Server frame: error, usually followed by the server closing.
pub const ERROR: &str = "ERROR";

// ============================================================================
// Constructors
// ============================================================================

/// Builds a `CONNECT` frame.
#[must_use]
pub fn connect(host: &str, extra: &[(String, String)]) -> Frame {
    let mut frame = Frame::new(CONNECT)
        .header("accept-version", "1.2,1.1,1.0")
        .header("host", host)
        .header("heart-beat", "0,0");
    frame.headers.extend(extra.iter().cloned());
    frame
}

/// Builds a `SUBSCRIBE` frame.
#[must_use]
pub fn subscribe(id: &str, destination: &str) -> Frame {
    Frame::new(SUBSCRIBE)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

/// Builds an `UNSUBSCRIBE` frame.
#[must_use]
pub fn unsubscribe(id: &str) -> Frame {
    Frame::new(UNSUBSCRIBE).header("id", id)
}

/// Builds a `SEND` frame carrying `payload` unmodified.
///
/// Always carries `content-length`, so a payload containing NUL survives.
#[must_use]
pub fn send(destination: &str, payload: &str) -> Frame {
    Frame::new(SEND)
        .header("destination", destination)
        .header("content-length", payload.len().to_string())
        .set_body(payload)
}

/// Builds a `DISCONNECT` frame asking for a receipt.
#[must_use]
pub fn disconnect(receipt: &str) -> Frame {
    Frame::new(DISCONNECT).receipt(receipt)
}

/// Converts a frame body to text.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the body is not UTF-8.
pub fn body_text(body: Vec<u8>) -> Result<String> {
    String::from_utf8(body)
        .map_err(|e| Error::protocol(format!("Frame body is not valid UTF-8: {e}")))
}

// ============================================================================
// FrameCodec
// ============================================================================

/// [`StompCodec`] applied to WebSocket message payloads.
///
/// Keeps the tail of an incomplete frame until the next payload completes it.
#[derive(Default)]
pub struct FrameCodec {
    codec: StompCodec,
    buffer: BytesMut,
}

impl FrameCodec {
    /// Creates a codec with an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of buffered bytes not yet decoded.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Serializes `frame` including the trailing NUL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the encoded frame is not UTF-8 and so
    /// cannot travel as a text message.
    pub fn encode(&mut self, frame: Frame) -> Result<String> {
        let mut out = BytesMut::with_capacity(64 + frame.body.len());
        self.codec
            .encode(StompItem::Frame(frame), &mut out)
            .map_err(|e| Error::protocol(e.to_string()))?;

        String::from_utf8(out.to_vec())
            .map_err(|e| Error::protocol(format!("Encoded frame is not valid UTF-8: {e}")))
    }

    /// Decodes every complete frame in `data` after any buffered bytes,
    /// skipping heart-beats.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on a malformed frame. The buffer is
    /// cleared so the next payload starts fresh.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(StompItem::Frame(frame))) => frames.push(frame),
                Ok(Some(StompItem::Heartbeat)) => {}
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    return Err(Error::protocol(e.to_string()));
                }
            }
        }

        Ok(frames)
    }
}

// ============================================================================
// Tests
// ============================================================================

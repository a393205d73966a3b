//! SockJS framing over a raw WebSocket.
//!
//! When the fallback transport is selected the client connects to the
//! SockJS WebSocket endpoint and every STOMP frame travels inside SockJS
//! framing.
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `o` | Session open |
//! | `h` | Heart-beat |
//! | `a["..",".."]` | Array of messages |
//! | `c[3000,"Go away!"]` | Session closed with code and reason |
//!
//! Client-to-server messages are JSON arrays of strings.

// ============================================================================
// Imports
// ============================================================================

use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// SockJsFrame
// ============================================================================

/// A frame received from a SockJS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session opened.
    Open,

    /// Keep-alive.
    Heartbeat,

    /// One or more messages.
    Messages(Vec<String>),

    /// Session closed by the server.
    Close {
        /// SockJS close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl SockJsFrame {
    /// Parses a SockJS frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an unknown frame type and
    /// [`Error::Json`] for a malformed payload.
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("Empty SockJS frame"))?;
        let payload = chars.as_str();

        match kind {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => Ok(Self::Messages(serde_json::from_str(payload)?)),
            'm' => Ok(Self::Messages(vec![serde_json::from_str(payload)?])),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload)?;
                Ok(Self::Close { code, reason })
            }
            other => Err(Error::protocol(format!("Unknown SockJS frame type '{other}'"))),
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Wraps outbound messages as a SockJS JSON array.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_messages<S: AsRef<str>>(messages: &[S]) -> Result<String> {
    let messages: Vec<&str> = messages.iter().map(AsRef::as_ref).collect();
    Ok(serde_json::to_string(&messages)?)
}

// ============================================================================
// URL
// ============================================================================

/// Builds a SockJS WebSocket URL with random server and session IDs.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] if `base` uses an unsupported scheme.
pub fn websocket_url(base: &Url) -> Result<Url> {
    let session = Uuid::new_v4();
    let server = format!("{:03}", session.as_u128() % 1000);
    websocket_url_with(base, &server, &session.simple().to_string())
}

/// Builds `{base}/{server_id}/{session_id}/websocket` with a WebSocket scheme.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] if `base` uses an unsupported scheme.
pub fn websocket_url_with(base: &Url, server_id: &str, session_id: &str) -> Result<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::invalid_endpoint(
                base.as_str(),
                format!("scheme '{other}' cannot carry SockJS"),
            ));
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::invalid_endpoint(base.as_str(), "cannot switch to WebSocket scheme"))?;

    let path = format!(
        "{}/{server_id}/{session_id}/websocket",
        base.path().trim_end_matches('/')
    );
    url.set_path(&path);
    url.set_fragment(None);

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================

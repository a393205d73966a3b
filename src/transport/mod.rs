//! Transport capability interface.
//!
//! The session never touches the wire. It drives a [`Transport`] that
//! opens connections and hands back a [`TransportHandle`], and it learns
//! about the connection through the [`TransportHandlers`] it passes in.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   connect(endpoint, mode, handlers)   ┌──────────────────┐
//! │                 │──────────────────────────────────────►│  Transport       │
//! │  Session        │                                       │                  │
//! │                 │◄──────── Arc<dyn TransportHandle> ────│  (WebSocket /    │
//! │                 │                                       │   SockJS)        │
//! │                 │◄── on_connect / on_error / on_disc. ──│                  │
//! └─────────────────┘                                       └──────────────────┘
//! ```
//!
//! # Contract
//!
//! - Every method is non-blocking; outcomes arrive through the handlers.
//! - Handlers are never invoked synchronously from inside a `Transport` or
//!   `TransportHandle` call; they fire later from the transport's own task.
//! - After [`TransportHandle::unsubscribe`] returns, the listener for that
//!   subscription is no longer invoked.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | CONNECT headers and timeouts for [`WebSocketTransport`] |
//! | `websocket` | STOMP over WebSocket / SockJS transport |

// ============================================================================
// Submodules
// ============================================================================

/// Transport configuration.
pub mod options;

/// STOMP over WebSocket transport and event loop.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::identifiers::SubscriptionId;
use crate::message::MessageListener;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::ConnectOptions;
pub use websocket::{WebSocketHandle, WebSocketTransport};

// ============================================================================
// TransportMode
// ============================================================================

/// How the transport reaches the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plain WebSocket to the endpoint URL.
    #[default]
    WebSocket,

    /// SockJS fallback framing over the SockJS WebSocket endpoint.
    SockJs,
}

impl TransportMode {
    /// Selects the mode from a fallback flag.
    #[inline]
    #[must_use]
    pub const fn from_fallback(use_fallback: bool) -> Self {
        if use_fallback {
            Self::SockJs
        } else {
            Self::WebSocket
        }
    }

    /// Returns `true` for [`TransportMode::SockJs`].
    #[inline]
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::SockJs)
    }

    /// Returns the mode name as a string.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::SockJs => "sockjs",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportHandlers
// ============================================================================

/// Lifecycle callback type with no payload.
pub type LifecycleHandler = Box<dyn Fn() + Send + Sync>;

/// Error callback type; receives the transport's cause verbatim.
pub type ErrorHandler = Box<dyn Fn(String) + Send + Sync>;

/// Lifecycle event sinks handed to [`Transport::connect`].
///
/// Each logical event is reported at most once.
pub struct TransportHandlers {
    on_connect: LifecycleHandler,
    on_error: ErrorHandler,
    on_disconnect: LifecycleHandler,
}

impl TransportHandlers {
    /// Creates handlers from three callbacks.
    pub fn new(
        on_connect: impl Fn() + Send + Sync + 'static,
        on_error: impl Fn(String) + Send + Sync + 'static,
        on_disconnect: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_connect: Box::new(on_connect),
            on_error: Box::new(on_error),
            on_disconnect: Box::new(on_disconnect),
        }
    }

    /// Creates handlers that ignore every event.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {}, |_| {}, || {})
    }

    /// Reports that the STOMP session is established.
    #[inline]
    pub fn connected(&self) {
        (self.on_connect)()
    }

    /// Reports a protocol or transport error.
    #[inline]
    pub fn error(&self, cause: impl Into<String>) {
        (self.on_error)(cause.into())
    }

    /// Reports that the connection is gone.
    #[inline]
    pub fn disconnected(&self) {
        (self.on_disconnect)()
    }
}

impl fmt::Debug for TransportHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandlers").finish_non_exhaustive()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Opens connections to a STOMP broker.
pub trait Transport: Send + Sync {
    /// Starts connecting and returns immediately.
    ///
    /// # Errors
    ///
    /// Only for failures detectable before any I/O (bad URL, no runtime).
    /// Everything else is reported through `handlers`.
    fn connect(
        &self,
        endpoint: &Url,
        mode: TransportMode,
        handlers: TransportHandlers,
    ) -> Result<Arc<dyn TransportHandle>>;
}

/// A live (or connecting) transport connection.
pub trait TransportHandle: Send + Sync {
    /// Deactivates the connection regardless of its current state.
    ///
    /// Idempotent.
    fn disconnect(&self);

    /// Creates an underlying subscription delivering to `listener`.
    fn subscribe(
        &self,
        destination: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<SubscriptionId>;

    /// Closes an underlying subscription.
    fn unsubscribe(&self, id: &SubscriptionId) -> Result<()>;

    /// Publishes `payload` to `destination`.
    fn send(&self, destination: &str, payload: &str) -> Result<()>;

    /// Live transport state, not the session's cached state.
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Tests
// ============================================================================

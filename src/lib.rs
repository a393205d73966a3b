//! STOMP Session - callback-driven STOMP client over WebSocket and SockJS.
//!
//! This library gives an application one logical STOMP connection with
//! connect/disconnect lifecycle, destination subscriptions and publishing,
//! reported through a small set of callbacks.
//!
//! # Architecture
//!
//! The crate is split at the transport boundary:
//!
//! - **Session (core)**: connection state machine plus the subscription
//!   registry; never touches the wire
//! - **Transport (collaborator)**: opens the socket, speaks STOMP, and
//!   reports lifecycle events back to the session
//!
//! Key design principles:
//!
//! - Connect and disconnect are idempotent
//! - At most one subscription per destination (re-subscribing replaces)
//! - No callback from an abandoned connection attempt reaches the app
//! - Every call is non-blocking; outcomes arrive through callbacks
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stomp_session::{Message, Result, Session, SessionCallback};
//!
//! struct App;
//!
//! impl SessionCallback for App {
//!     fn on_connect(&self) {
//!         println!("connected");
//!     }
//!     fn on_error(&self, cause: &str) {
//!         eprintln!("error: {cause}");
//!     }
//!     fn on_disconnect(&self) {
//!         println!("disconnected");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .endpoint("ws://localhost:61614/ws")
//!         .callback(Arc::new(App))
//!         .build()?;
//!     session.connect()?;
//!
//!     // After on_connect:
//!     session.subscribe("/topic/greetings", |message: Message| {
//!         println!("{}", message.body);
//!     })?;
//!     session.send("/app/hello", r#"{"name":"world"}"#)?;
//!
//!     session.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`Session`], [`SessionBuilder`], subscription registry |
//! | [`transport`] | [`Transport`] capability traits and [`WebSocketTransport`] |
//! | [`protocol`] | STOMP and SockJS framing (internal to the transport) |
//! | [`message`] | [`Message`] and [`MessageListener`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Inbound messages and listeners.
pub mod message;

/// STOMP and SockJS wire formats.
///
/// Used by [`WebSocketTransport`]; the session never sees frames.
pub mod protocol;

/// Session controller and subscription registry.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport capability interface and the WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{
    ConnectionState, Session, SessionBuilder, SessionCallback, Subscription,
    SubscriptionRegistry, TeardownReport,
};

// Message types
pub use message::{Message, MessageListener};

// Transport types
pub use transport::{
    ConnectOptions, Transport, TransportHandle, TransportHandlers, TransportMode,
    WebSocketTransport,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{SessionId, SubscriptionId};

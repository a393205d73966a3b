//! Wire formats used by the WebSocket transport.
//!
//! The session core never sees these types; they live behind the
//! [`Transport`](crate::transport::Transport) boundary.
//!
//! # Layering
//!
//! | Layer | Mode | Unit |
//! |-------|------|------|
//! | STOMP | both | [`Frame`] |
//! | SockJS | fallback only | [`SockJsFrame`] wrapping STOMP text |
//! | WebSocket | both | text message |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | STOMP 1.2 client frames and the `iridium-stomp` codec adapter |
//! | `sockjs` | SockJS framing and endpoint URLs |

// ============================================================================
// Submodules
// ============================================================================

/// STOMP frame codec.
pub mod frame;

/// SockJS framing.
pub mod sockjs;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, FrameCodec};
pub use sockjs::SockJsFrame;

//! Session controller and subscription registry.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`SessionBuilder`] configuration |
//! | `callback` | [`SessionCallback`] lifecycle notifications |
//! | `core` | [`Session`] state machine |
//! | `registry` | [`SubscriptionRegistry`] and [`Subscription`] |

// ============================================================================
// Submodules
// ============================================================================

/// Session builder.
pub mod builder;

/// Application lifecycle callback.
pub mod callback;

/// Session controller.
pub mod core;

/// Destination-keyed subscription registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use callback::SessionCallback;
pub use self::core::{ConnectionState, Session};
pub use registry::{Subscription, SubscriptionRegistry, TeardownReport};

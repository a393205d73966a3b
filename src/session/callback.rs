//! Application-facing lifecycle notifications.

// ============================================================================
// SessionCallback
// ============================================================================

/// Receives session lifecycle notifications.
///
/// Callbacks run on the transport's task with no session lock held, so
/// they may call back into the [`Session`](crate::Session).
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl SessionCallback for Printer {
///     fn on_connect(&self) {
///         println!("connected");
///     }
///
///     fn on_error(&self, cause: &str) {
///         eprintln!("stomp error: {cause}");
///     }
///
///     fn on_disconnect(&self) {
///         println!("disconnected");
///     }
/// }
/// ```
pub trait SessionCallback: Send + Sync {
    /// The STOMP session is established.
    ///
    /// Fires once per successful connect.
    fn on_connect(&self);

    /// The transport reported an error.
    ///
    /// Does not imply a disconnect; that is reported separately.
    fn on_error(&self, cause: &str);

    /// The session is disconnected, either on request or because the
    /// transport dropped.
    fn on_disconnect(&self);
}

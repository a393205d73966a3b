//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use stomp_session::Session;
//!
//! # fn example() -> stomp_session::Result<()> {
//! let session = Session::builder()
//!     .endpoint("https://broker.example/stomp")
//!     .sockjs()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{ConnectOptions, Transport, TransportMode, WebSocketTransport};

use super::callback::SessionCallback;
use super::core::Session;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionBuilder {
    /// Broker endpoint, unparsed.
    endpoint: Option<String>,
    /// Transport mode.
    mode: TransportMode,
    /// Application callback.
    callback: Option<Arc<dyn SessionCallback>>,
    /// Custom transport; defaults to [`WebSocketTransport`].
    transport: Option<Arc<dyn Transport>>,
    /// Options for the default transport.
    options: ConnectOptions,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("endpoint", &self.endpoint)
            .field("mode", &self.mode)
            .field("has_callback", &self.callback.is_some())
            .field("custom_transport", &self.transport.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the broker endpoint URL.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://`/`wss://` for WebSocket; SockJS also accepts
    ///   `http://`/`https://`
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Chooses SockJS (`true`) or plain WebSocket (`false`).
    #[inline]
    #[must_use]
    pub fn fallback(mut self, use_fallback: bool) -> Self {
        self.mode = TransportMode::from_fallback(use_fallback);
        self
    }

    /// Uses the SockJS fallback transport.
    #[inline]
    #[must_use]
    pub fn sockjs(self) -> Self {
        self.fallback(true)
    }

    /// Sets the transport mode directly.
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the lifecycle callback.
    #[inline]
    #[must_use]
    pub fn callback(mut self, callback: Arc<dyn SessionCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Replaces the default transport.
    ///
    /// [`SessionBuilder::options`] is ignored when a custom transport is set.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets options for the default [`WebSocketTransport`].
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set or options are invalid
    /// - [`Error::InvalidEndpoint`] if the URL does not fit the mode
    pub fn build(self) -> Result<Session> {
        let endpoint = self.validate_endpoint()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                self.options.validate().map_err(Error::config)?;
                Arc::new(WebSocketTransport::new(self.options))
            }
        };

        Ok(Session::from_parts(
            endpoint,
            self.mode,
            self.callback,
            transport,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    /// Parses the endpoint and checks its scheme against the mode.
    fn validate_endpoint(&self) -> Result<Url> {
        let raw = self.endpoint.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Session::builder().endpoint(\"wss://broker.example/ws\")",
            )
        })?;

        let url = Url::parse(raw).map_err(|e| Error::invalid_endpoint(raw, e.to_string()))?;

        let allowed: &[&str] = match self.mode {
            TransportMode::WebSocket => &["ws", "wss"],
            TransportMode::SockJs => &["http", "https", "ws", "wss"],
        };

        if !allowed.contains(&url.scheme()) {
            return Err(Error::invalid_endpoint(
                raw,
                format!(
                    "scheme '{}' not supported in {} mode (expected one of: {})",
                    url.scheme(),
                    self.mode,
                    allowed.join(", ")
                ),
            ));
        }

        if url.host_str().is_none() {
            return Err(Error::invalid_endpoint(raw, "missing host"));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Connection options for the WebSocket transport.
//!
//! Controls the extra headers sent in the STOMP `CONNECT` frame and the
//! connect timeout.
//!
//! # Example
//!
//! ```ignore
//! use stomp_session::ConnectOptions;
//!
//! let options = ConnectOptions::new()
//!     .with_host("/")
//!     .with_header("login", "guest")
//!     .with_header("passcode", "guest");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed to reach `CONNECTED`.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers the transport sets itself.
const RESERVED_HEADERS: &[&str] = &["accept-version", "heart-beat"];

/// Characters a `CONNECT` header cannot carry. Brokers read `CONNECT`
/// headers without unescaping.
const FORBIDDEN_CHARS: [char; 4] = [':', '\\', '\n', '\r'];

// ============================================================================
// ConnectOptions
// ============================================================================

/// WebSocket transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Virtual host for the `host` header. Defaults to the endpoint host.
    pub host: Option<String>,

    /// Extra `CONNECT` headers, passed through verbatim.
    pub headers: Vec<(String, String)>,

    /// Time allowed from opening the socket until the broker sends
    /// `CONNECTED`. Covers the WebSocket handshake, the SockJS open frame
    /// and the STOMP handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            host: None,
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectOptions {
    /// Sets the `host` header.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Adds a `CONNECT` header.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds multiple `CONNECT` headers.
    #[inline]
    #[must_use]
    pub fn with_headers(
        mut self,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }

        if let Some(host) = &self.host
            && host.contains(FORBIDDEN_CHARS)
        {
            return Err(format!("Invalid character in host {host:?}"));
        }

        for (name, value) in &self.headers {
            if name.is_empty() {
                return Err("Header names must not be empty".to_string());
            }
            if name.contains(FORBIDDEN_CHARS) {
                return Err(format!("Invalid character in header name {name:?}"));
            }
            if value.contains(FORBIDDEN_CHARS) {
                return Err(format!("Invalid character in value of header '{name}'"));
            }
            if RESERVED_HEADERS.contains(&name.as_str()) || name == "host" {
                return Err(format!("Header '{name}' is managed by the transport"));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Session controller.
//!
//! Owns the connection state machine and the subscription registry, and
//! turns raw transport events into [`SessionCallback`] notifications.
//!
//! # State Machine
//!
//! ```text
//!               connect()               on_connect
//! Disconnected ──────────► Connecting ──────────────► Connected
//!      ▲                       │                          │
//!      └───────────────────────┴──────────────────────────┘
//!           disconnect() or on_disconnect from the transport
//! ```
//!
//! Every connect starts a new attempt. Transport events carry the attempt
//! that produced them; events from an abandoned attempt are dropped, so a
//! late `on_connect` after `disconnect()` never re-enters `Connected`.
//!
//! Every transition into `Disconnected` is announced exactly once through
//! [`SessionCallback::on_disconnect`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::message::MessageListener;
use crate::transport::{Transport, TransportHandle, TransportHandlers, TransportMode};

use super::builder::SessionBuilder;
use super::callback::SessionCallback;
use super::registry::{Subscription, SubscriptionRegistry, TeardownReport};

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,

    /// Transport asked to connect; waiting for the broker.
    Connecting,

    /// STOMP session established.
    Connected,
}

impl ConnectionState {
    /// Returns the state name as a string.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Types
// ============================================================================

/// Mutable session state, guarded by one lock.
struct SessionState {
    /// Current connection state.
    state: ConnectionState,
    /// Current connection attempt. Bumped on connect and on every
    /// transition into `Disconnected`.
    attempt: u64,
    /// Set while a transport-reported disconnect is being announced.
    disconnecting: bool,
    /// Live transport handle; present only while connecting or connected.
    handle: Option<Arc<dyn TransportHandle>>,
    /// Active subscriptions.
    registry: SubscriptionRegistry,
}

/// Internal shared state for a session.
pub(crate) struct SessionInner {
    /// Diagnostic identifier.
    id: SessionId,
    /// Broker endpoint.
    endpoint: Url,
    /// WebSocket or SockJS.
    mode: TransportMode,
    /// Application callback, shared with the application.
    callback: Option<Arc<dyn SessionCallback>>,
    /// Connection factory.
    transport: Arc<dyn Transport>,
    /// Guarded mutable state.
    state: Mutex<SessionState>,
}

// ============================================================================
// Session
// ============================================================================

/// A STOMP session: one logical connection plus its subscriptions.
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use stomp_session::{Message, Session, SessionCallback};
///
/// struct App;
///
/// impl SessionCallback for App {
///     fn on_connect(&self) {}
///     fn on_error(&self, cause: &str) {
///         eprintln!("{cause}");
///     }
///     fn on_disconnect(&self) {}
/// }
///
/// # async fn example() -> stomp_session::Result<()> {
/// let session = Session::builder()
///     .endpoint("wss://broker.example/ws")
///     .callback(Arc::new(App))
///     .build()?;
///
/// session.connect()?;
///
/// // Later, once `on_connect` fired:
/// session.subscribe("/topic/news", |message: Message| {
///     println!("{}", message.body);
/// })?;
/// session.send("/app/hello", r#"{"name":"ada"}"#)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("mode", &self.inner.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Creates a session builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a session using the default [`WebSocketTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the URL does not fit the mode.
    ///
    /// [`WebSocketTransport`]: crate::transport::WebSocketTransport
    pub fn new(
        endpoint: &str,
        callback: Option<Arc<dyn SessionCallback>>,
        use_fallback: bool,
    ) -> Result<Self> {
        let mut builder = Session::builder().endpoint(endpoint).fallback(use_fallback);
        if let Some(callback) = callback {
            builder = builder.callback(callback);
        }
        builder.build()
    }

    pub(crate) fn from_parts(
        endpoint: Url,
        mode: TransportMode,
        callback: Option<Arc<dyn SessionCallback>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let id = SessionId::generate();
        debug!(session_id = %id, endpoint = %endpoint, %mode, "Session created");

        Self {
            inner: Arc::new(SessionInner {
                id,
                endpoint,
                mode,
                callback,
                transport,
                state: Mutex::new(SessionState {
                    state: ConnectionState::Disconnected,
                    attempt: 0,
                    disconnecting: false,
                    handle: None,
                    registry: SubscriptionRegistry::new(),
                }),
            }),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the broker endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns the transport mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.inner.mode
    }

    /// Returns `true` if the SockJS fallback transport is used.
    #[inline]
    #[must_use]
    pub fn use_fallback(&self) -> bool {
        self.inner.mode.is_fallback()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().state
    }

    /// Returns `true` once the broker acknowledged the connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Queries the transport itself rather than the session's state.
    ///
    /// `false` when there is no transport handle.
    #[must_use]
    pub fn transport_connected(&self) -> bool {
        let handle = self.inner.state.lock().handle.clone();
        handle.is_some_and(|h| h.is_connected())
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Returns `true` if `destination` has a live subscription.
    #[must_use]
    pub fn is_subscribed(&self, destination: &str) -> bool {
        self.inner.state.lock().registry.contains(destination)
    }

    /// Returns the subscribed destinations in no particular order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.state.lock().registry.destinations()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Starts connecting to the endpoint.
    ///
    /// Returns immediately; [`SessionCallback::on_connect`] reports success.
    /// Does nothing while connecting or connected.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if it rejects the attempt before any
    /// I/O. The session stays disconnected.
    pub fn connect(&self) -> Result<()> {
        let attempt = {
            let mut state = self.inner.state.lock();
            if state.state != ConnectionState::Disconnected {
                debug!(session_id = %self.inner.id, state = %state.state, "Already connecting or connected");
                return Ok(());
            }
            state.state = ConnectionState::Connecting;
            state.attempt += 1;
            state.attempt
        };

        info!(
            session_id = %self.inner.id,
            endpoint = %self.inner.endpoint,
            mode = %self.inner.mode,
            attempt,
            "Connecting"
        );

        let handlers = self.handlers(attempt);
        let result = self
            .inner
            .transport
            .connect(&self.inner.endpoint, self.inner.mode, handlers);

        let mut state = self.inner.state.lock();
        let current = state.attempt == attempt;

        match result {
            Ok(handle) if current => {
                state.handle = Some(handle);
                Ok(())
            }
            Ok(handle) => {
                // disconnect() ran while the transport was starting up
                drop(state);
                debug!(session_id = %self.inner.id, attempt, "Connect cancelled, deactivating transport");
                handle.disconnect();
                Ok(())
            }
            Err(e) => {
                if current {
                    state.state = ConnectionState::Disconnected;
                    state.attempt += 1;
                }
                warn!(session_id = %self.inner.id, error = %e, "Transport rejected connect");
                Err(e)
            }
        }
    }

    /// Closes every subscription, then deactivates the transport.
    ///
    /// Safe to call in any state; does nothing when already disconnected.
    /// Cancels an attempt still in flight. Individual unsubscribe failures
    /// are collected in the report and never abort the teardown.
    pub fn disconnect(&self) -> TeardownReport {
        let (handle, report) = {
            let mut state = self.inner.state.lock();
            if state.state == ConnectionState::Disconnected || state.disconnecting {
                trace!(session_id = %self.inner.id, "Already disconnected");
                return TeardownReport::default();
            }

            let handle = state.handle.take();
            let report = match handle.as_deref() {
                Some(handle) => state.registry.teardown(handle),
                None => {
                    state.registry.clear();
                    TeardownReport::default()
                }
            };

            state.state = ConnectionState::Disconnected;
            state.attempt += 1;
            (handle, report)
        };

        info!(
            session_id = %self.inner.id,
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Disconnecting"
        );

        if let Some(handle) = handle {
            handle.disconnect();
        }

        if let Some(callback) = &self.inner.callback {
            callback.on_disconnect();
        }

        report
    }
}

// ============================================================================
// Session - Messaging
// ============================================================================

impl Session {
    /// Subscribes `listener` to `destination`.
    ///
    /// An existing subscription for the same destination is closed and
    /// replaced. Messages go straight from the transport to the listener.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected
    /// - the transport's error if the subscription cannot be created
    pub fn subscribe<L>(&self, destination: &str, listener: L) -> Result<Subscription>
    where
        L: MessageListener + 'static,
    {
        self.subscribe_shared(destination, Arc::new(listener))
    }

    /// Like [`Session::subscribe`] with a listener the caller keeps sharing.
    ///
    /// # Errors
    ///
    /// Same as [`Session::subscribe`].
    pub fn subscribe_shared(
        &self,
        destination: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<Subscription> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let handle = match (&state.state, &state.handle) {
            (ConnectionState::Connected, Some(handle)) => Arc::clone(handle),
            _ => return Err(Error::not_connected(format!("subscribe to '{destination}'"))),
        };

        state.registry.subscribe(handle.as_ref(), destination, listener)
    }

    /// Closes the subscription for `destination`.
    ///
    /// Does nothing if `destination` is not subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsubscribe`] if the transport fails to close it;
    /// the subscription is forgotten regardless.
    pub fn unsubscribe(&self, destination: &str) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(handle) = state.handle.clone() else {
            return Ok(());
        };

        state.registry.unsubscribe(handle.as_ref(), destination)?;
        Ok(())
    }

    /// Publishes `payload` to `destination` unmodified.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected
    /// - the transport's error if it cannot queue the frame
    pub fn send(&self, destination: &str, payload: &str) -> Result<()> {
        let handle = {
            let state = self.inner.state.lock();
            match (&state.state, &state.handle) {
                (ConnectionState::Connected, Some(handle)) => Arc::clone(handle),
                _ => return Err(Error::not_connected(format!("send to '{destination}'"))),
            }
        };

        trace!(session_id = %self.inner.id, destination, bytes = payload.len(), "Sending");
        handle.send(destination, payload)
    }
}

// ============================================================================
// Session - Transport Events
// ============================================================================

impl Session {
    /// Builds the handlers passed to the transport for one attempt.
    fn handlers(&self, attempt: u64) -> TransportHandlers {
        let on_connect = Arc::downgrade(&self.inner);
        let on_error = Arc::downgrade(&self.inner);
        let on_disconnect = Arc::downgrade(&self.inner);

        TransportHandlers::new(
            move || {
                if let Some(inner) = Weak::upgrade(&on_connect) {
                    SessionInner::handle_connect(&inner, attempt);
                }
            },
            move |cause| {
                if let Some(inner) = Weak::upgrade(&on_error) {
                    SessionInner::handle_error(&inner, attempt, &cause);
                }
            },
            move || {
                if let Some(inner) = Weak::upgrade(&on_disconnect) {
                    SessionInner::handle_disconnect(&inner, attempt);
                }
            },
        )
    }
}

impl SessionInner {
    /// Transport reports the STOMP session is up.
    fn handle_connect(inner: &Arc<Self>, attempt: u64) {
        {
            let mut state = inner.state.lock();
            if state.attempt != attempt || state.state != ConnectionState::Connecting {
                debug!(session_id = %inner.id, attempt, state = %state.state, "Ignoring connect event");
                return;
            }
            state.state = ConnectionState::Connected;
        }

        info!(session_id = %inner.id, endpoint = %inner.endpoint, "Connected");

        if let Some(callback) = &inner.callback {
            callback.on_connect();
        }
    }

    /// Transport reports an error. State is left alone.
    fn handle_error(inner: &Arc<Self>, attempt: u64, cause: &str) {
        if inner.state.lock().attempt != attempt {
            debug!(session_id = %inner.id, attempt, cause, "Ignoring stale error event");
            return;
        }

        warn!(session_id = %inner.id, cause, "Transport error");

        if let Some(callback) = &inner.callback {
            callback.on_error(cause);
        }
    }

    /// Transport reports the connection is gone.
    ///
    /// The callback runs before the state is committed.
    fn handle_disconnect(inner: &Arc<Self>, attempt: u64) {
        {
            let mut state = inner.state.lock();
            if state.attempt != attempt
                || state.state == ConnectionState::Disconnected
                || state.disconnecting
            {
                debug!(session_id = %inner.id, attempt, "Ignoring disconnect event");
                return;
            }
            state.disconnecting = true;
        }

        if let Some(callback) = &inner.callback {
            callback.on_disconnect();
        }

        let (handle, dropped) = {
            let mut state = inner.state.lock();
            state.disconnecting = false;
            state.state = ConnectionState::Disconnected;
            state.attempt += 1;
            (state.handle.take(), state.registry.clear())
        };

        info!(session_id = %inner.id, dropped_subscriptions = dropped, "Disconnected by transport");

        if let Some(handle) = handle {
            handle.disconnect();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

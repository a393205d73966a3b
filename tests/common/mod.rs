//! Shared test fixtures.
//!
//! [`MockTransport`] records every call a session makes and lets tests fire
//! transport events by hand. [`RecordingCallback`] records what the
//! application would see.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use url::Url;

use stomp_session::{
    Error, Message, MessageListener, Result, Session, SessionCallback, SubscriptionId, Transport,
    TransportHandle, TransportHandlers, TransportMode,
};

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// RecordingCallback
// ============================================================================

/// Lifecycle notification seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Error(String),
    Disconnect,
}

#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<Event>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, Event::Connect))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|e| matches!(e, Event::Disconnect))
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Error(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl SessionCallback for RecordingCallback {
    fn on_connect(&self) {
        self.events.lock().push(Event::Connect);
    }

    fn on_error(&self, cause: &str) {
        self.events.lock().push(Event::Error(cause.to_string()));
    }

    fn on_disconnect(&self) {
        self.events.lock().push(Event::Disconnect);
    }
}

// ============================================================================
// MockHandle
// ============================================================================

/// Call made on a [`MockHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe(String, SubscriptionId),
    Unsubscribe(SubscriptionId),
    Send(String, String),
    Disconnect,
}

struct Route {
    id: SubscriptionId,
    destination: String,
    listener: Arc<dyn MessageListener>,
}

pub struct MockHandle {
    calls: Mutex<Vec<Call>>,
    routes: Mutex<Vec<Route>>,
    failing_unsubscribes: Mutex<HashSet<String>>,
    fail_subscribe: AtomicBool,
    connected: AtomicBool,
    next_id: AtomicUsize,
}

impl MockHandle {
    fn new(failing_unsubscribes: HashSet<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
            failing_unsubscribes: Mutex::new(failing_unsubscribes),
            fail_subscribe: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Disconnect))
            .count()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Unsubscribe(_)))
            .count()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Send(d, p) => Some((d.clone(), p.clone())),
                _ => None,
            })
            .collect()
    }

    /// Makes unsubscribes for `destination` fail.
    pub fn fail_unsubscribe(&self, destination: &str) {
        self.failing_unsubscribes
            .lock()
            .insert(destination.to_string());
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    /// Delivers `body` to every listener on `destination`; returns how many.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let targets: Vec<(SubscriptionId, Arc<dyn MessageListener>)> = self
            .routes
            .lock()
            .iter()
            .filter(|r| r.destination == destination)
            .map(|r| (r.id.clone(), Arc::clone(&r.listener)))
            .collect();

        for (id, listener) in &targets {
            listener.on_message(Message::new(destination, id.clone(), body));
        }
        targets.len()
    }
}

impl TransportHandle for MockHandle {
    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.routes.lock().clear();
        self.calls.lock().push(Call::Disconnect);
    }

    fn subscribe(
        &self,
        destination: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<SubscriptionId> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::protocol(format!("subscribe to {destination} refused")));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = SubscriptionId::new(format!("sub-{n}"));
        self.routes.lock().push(Route {
            id: id.clone(),
            destination: destination.to_string(),
            listener,
        });
        self.calls
            .lock()
            .push(Call::Subscribe(destination.to_string(), id.clone()));
        Ok(id)
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        self.calls.lock().push(Call::Unsubscribe(id.clone()));

        let mut routes = self.routes.lock();
        let Some(index) = routes.iter().position(|r| &r.id == id) else {
            return Ok(());
        };

        if self
            .failing_unsubscribes
            .lock()
            .contains(&routes[index].destination)
        {
            return Err(Error::connection(format!("cannot close {id}")));
        }

        routes.remove(index);
        Ok(())
    }

    fn send(&self, destination: &str, payload: &str) -> Result<()> {
        self.calls
            .lock()
            .push(Call::Send(destination.to_string(), payload.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MockTransport
// ============================================================================

struct Attempt {
    endpoint: Url,
    mode: TransportMode,
    handlers: Arc<TransportHandlers>,
    handle: Arc<MockHandle>,
}

#[derive(Default)]
struct MockState {
    attempts: Vec<Attempt>,
    fail_connect: bool,
    failing_unsubscribes: HashSet<String>,
}

/// Transport that never touches the network.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Every handle created from now on fails unsubscribes for `destination`.
    pub fn fail_unsubscribe(&self, destination: &str) {
        self.state
            .lock()
            .failing_unsubscribes
            .insert(destination.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().attempts.len()
    }

    pub fn last_endpoint(&self) -> Option<Url> {
        self.state.lock().attempts.last().map(|a| a.endpoint.clone())
    }

    pub fn last_mode(&self) -> Option<TransportMode> {
        self.state.lock().attempts.last().map(|a| a.mode)
    }

    /// Handle of the most recent attempt.
    pub fn handle(&self) -> Arc<MockHandle> {
        self.handle_at(self.connect_count() - 1)
    }

    pub fn handle_at(&self, attempt: usize) -> Arc<MockHandle> {
        Arc::clone(&self.state.lock().attempts[attempt].handle)
    }

    fn handlers_at(&self, attempt: usize) -> Option<Arc<TransportHandlers>> {
        self.state
            .lock()
            .attempts
            .get(attempt)
            .map(|a| Arc::clone(&a.handlers))
    }

    fn latest_handlers(&self) -> Option<Arc<TransportHandlers>> {
        let state = self.state.lock();
        state.attempts.last().map(|a| Arc::clone(&a.handlers))
    }

    /// Fires `on_connect` for the latest attempt. Returns `false` if none.
    pub fn fire_connect(&self) -> bool {
        self.latest_handlers().map(|h| h.connected()).is_some()
    }

    pub fn fire_error(&self, cause: &str) -> bool {
        self.latest_handlers().map(|h| h.error(cause)).is_some()
    }

    pub fn fire_disconnect(&self) -> bool {
        self.latest_handlers().map(|h| h.disconnected()).is_some()
    }

    pub fn fire_connect_at(&self, attempt: usize) {
        if let Some(handlers) = self.handlers_at(attempt) {
            handlers.connected();
        }
    }

    pub fn fire_error_at(&self, attempt: usize, cause: &str) {
        if let Some(handlers) = self.handlers_at(attempt) {
            handlers.error(cause);
        }
    }

    pub fn fire_disconnect_at(&self, attempt: usize) {
        if let Some(handlers) = self.handlers_at(attempt) {
            handlers.disconnected();
        }
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        endpoint: &Url,
        mode: TransportMode,
        handlers: TransportHandlers,
    ) -> Result<Arc<dyn TransportHandle>> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(Error::connection("connection refused"));
        }

        let handle = Arc::new(MockHandle::new(state.failing_unsubscribes.clone()));
        state.attempts.push(Attempt {
            endpoint: endpoint.clone(),
            mode,
            handlers: Arc::new(handlers),
            handle: Arc::clone(&handle),
        });

        let handle: Arc<dyn TransportHandle> = handle;
        Ok(handle)
    }
}

// ============================================================================
// Session helpers
// ============================================================================

/// Builds a session over a fresh mock transport.
pub fn mock_session(endpoint: &str, use_fallback: bool) -> (Session, MockTransport, Arc<RecordingCallback>) {
    let transport = MockTransport::new();
    let callback = RecordingCallback::new();

    let session = Session::builder()
        .endpoint(endpoint)
        .fallback(use_fallback)
        .callback(callback.clone())
        .transport(Arc::new(transport.clone()))
        .build()
        .expect("valid endpoint");

    (session, transport, callback)
}

/// Builds a session and drives it to `Connected`.
pub fn connected_session() -> (Session, MockTransport, Arc<RecordingCallback>) {
    let (session, transport, callback) = mock_session("wss://example/ws", false);
    session.connect().expect("connect");
    assert!(transport.fire_connect());
    assert!(session.is_connected());
    (session, transport, callback)
}

/// Listener that counts deliveries and remembers the bodies.
#[derive(Default)]
pub struct Collector {
    pub bodies: Mutex<Vec<String>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().len()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }
}

impl MessageListener for Collector {
    fn on_message(&self, message: Message) {
        self.bodies.lock().push(message.body);
    }
}

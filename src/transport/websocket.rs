//! STOMP over WebSocket transport and event loop.
//!
//! [`WebSocketTransport::connect`] spawns one tokio task per connection.
//! The task owns the socket and handles:
//!
//! - Opening the WebSocket (directly, or via the SockJS endpoint)
//! - Sending `CONNECT` and reporting `CONNECTED` as `on_connect`
//! - Routing `MESSAGE` frames to subscription listeners
//! - Reporting `ERROR` frames and socket errors as `on_error`
//! - Giving up when `CONNECTED` does not arrive within the connect timeout
//! - Reporting the end of the connection as `on_disconnect`
//!
//! The returned [`WebSocketHandle`] only queues commands for the task, so
//! every [`TransportHandle`] call is non-blocking.

// ============================================================================
// Imports
// ============================================================================

use std::str::from_utf8;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::message::{Message, MessageListener};
use crate::protocol::frame::{self, Frame, FrameCodec};
use crate::protocol::sockjs::{self, SockJsFrame};

use super::options::ConnectOptions;
use super::{Transport, TransportHandle, TransportHandlers, TransportMode};

// ============================================================================
// Constants
// ============================================================================

/// Receipt requested with `DISCONNECT`.
const DISCONNECT_RECEIPT: &str = "disconnect-0";

// ============================================================================
// Types
// ============================================================================

/// Write half of the socket.
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Map of subscription IDs to their listeners.
type RouteMap = FxHashMap<SubscriptionId, Route>;

/// Where messages for one subscription go.
struct Route {
    destination: String,
    listener: Arc<dyn MessageListener>,
}

/// State shared between the handle and the event loop.
#[derive(Default)]
struct Shared {
    /// Live subscriptions.
    routes: Mutex<RouteMap>,
    /// `CONNECTED` received and socket still open.
    connected: AtomicBool,
    /// Event loop terminated.
    closed: AtomicBool,
}

/// Commands for the event loop.
enum TransportCommand {
    /// Write a frame.
    Frame(Frame),
    /// Send `DISCONNECT` if connected, then close the socket.
    Shutdown,
}

/// Result of processing inbound text.
enum Flow {
    /// Keep reading.
    Continue,
    /// SockJS session opened; `CONNECT` may be sent.
    Open,
    /// Server closed the session.
    Close,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport speaking STOMP 1.2 over WebSocket or SockJS.
///
/// Requires a running Tokio runtime when [`Transport::connect`] is called.
/// `wss://` endpoints need one of the `native-tls` or `rustls` features.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    options: ConnectOptions,
}

impl WebSocketTransport {
    /// Creates a transport with the given options.
    #[inline]
    #[must_use]
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    /// Returns the transport options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Resolves the URL to open for `mode`.
    fn socket_url(endpoint: &Url, mode: TransportMode) -> Result<Url> {
        match mode {
            TransportMode::WebSocket => Ok(endpoint.clone()),
            TransportMode::SockJs => sockjs::websocket_url(endpoint),
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &self,
        endpoint: &Url,
        mode: TransportMode,
        handlers: TransportHandlers,
    ) -> Result<Arc<dyn TransportHandle>> {
        self.options.validate().map_err(Error::config)?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("WebSocketTransport requires a Tokio runtime"))?;

        let url = Self::socket_url(endpoint, mode)?;
        let host = self
            .options
            .host
            .clone()
            .or_else(|| endpoint.host_str().map(str::to_string))
            .unwrap_or_else(|| "/".to_string());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        debug!(url = %url, %mode, "Spawning transport event loop");

        runtime.spawn(
            EventLoop {
                url,
                mode,
                connect_frame: frame::connect(&host, &self.options.headers),
                connect_timeout: self.options.connect_timeout,
                handlers,
                shared: Arc::clone(&shared),
            }
            .run(command_rx),
        );

        Ok(Arc::new(WebSocketHandle {
            command_tx,
            shared,
            next_id: AtomicU64::new(0),
        }))
    }
}

// ============================================================================
// WebSocketHandle
// ============================================================================

/// Handle to one [`WebSocketTransport`] connection.
pub struct WebSocketHandle {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
    /// Next subscription number.
    next_id: AtomicU64,
}

impl WebSocketHandle {
    /// Returns the number of routed subscriptions.
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.routes.lock().len()
    }

    /// Returns `true` once the event loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn queue(&self, frame: Frame) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Frame(frame))
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl TransportHandle for WebSocketHandle {
    fn disconnect(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }

    fn subscribe(
        &self,
        destination: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::new(format!(
            "sub-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));

        self.shared.routes.lock().insert(
            id.clone(),
            Route {
                destination: destination.to_string(),
                listener,
            },
        );

        if let Err(e) = self.queue(frame::subscribe(id.as_str(), destination)) {
            self.shared.routes.lock().remove(&id);
            return Err(e);
        }

        Ok(id)
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        // Stop delivery now; the broker may still have messages in flight.
        self.shared.routes.lock().remove(id);
        self.queue(frame::unsubscribe(id.as_str()))
    }

    fn send(&self, destination: &str, payload: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::not_connected(format!("send to '{destination}'")));
        }
        self.queue(frame::send(destination, payload))
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Everything the connection task owns.
struct EventLoop {
    url: Url,
    mode: TransportMode,
    connect_frame: Frame,
    connect_timeout: Duration,
    handlers: TransportHandlers,
    shared: Arc<Shared>,
}

impl EventLoop {
    /// Runs the connection to completion, then reports `on_disconnect`.
    async fn run(self, mut command_rx: mpsc::UnboundedReceiver<TransportCommand>) {
        // Covers the handshake and the wait for CONNECTED.
        let deadline = Instant::now()
            .checked_add(self.connect_timeout)
            .unwrap_or_else(far_future);

        match timeout_at(deadline, connect_async(self.url.as_str())).await {
            Ok(Ok((ws_stream, _))) => {
                debug!(url = %self.url, "WebSocket open");
                self.drive(ws_stream, &mut command_rx, deadline).await;
            }
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "WebSocket connect failed");
                self.handlers.error(Error::connection(e.to_string()).to_string());
            }
            Err(_) => {
                let timeout_ms = millis(self.connect_timeout);
                warn!(url = %self.url, timeout_ms, "WebSocket connect timed out");
                self.handlers
                    .error(Error::connection_timeout(timeout_ms).to_string());
            }
        }

        self.shared.connected.store(false, Ordering::Release);
        self.shared.closed.store(true, Ordering::Release);
        self.shared.routes.lock().clear();

        debug!(url = %self.url, "Event loop terminated");
        self.handlers.disconnected();
    }

    /// Pumps the open socket until either side closes it.
    async fn drive(
        &self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
        deadline: Instant,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut codec = FrameCodec::new();

        // Frames queued before CONNECT went out.
        let mut pending: Vec<Frame> = Vec::new();
        let mut stomp_open = false;

        let connect_deadline = sleep_until(deadline);
        tokio::pin!(connect_deadline);

        if self.mode == TransportMode::WebSocket {
            if let Err(e) = self.open_stomp(&mut codec, &mut ws_write, &mut pending).await {
                self.handlers.error(e.to_string());
                return;
            }
            stomp_open = true;
        }

        loop {
            tokio::select! {
                // Incoming messages from the broker
                message = ws_read.next() => {
                    let flow = match message {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&mut codec, &text),

                        Some(Ok(WsMessage::Binary(data))) => self.handle_binary(&mut codec, &data),

                        Some(Ok(WsMessage::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            Flow::Close
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            self.handlers.error(e.to_string());
                            Flow::Close
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            Flow::Close
                        }

                        // Ignore Ping, Pong, raw Frame
                        _ => Flow::Continue,
                    };

                    match flow {
                        Flow::Continue => {}
                        Flow::Open if !stomp_open => {
                            if let Err(e) = self.open_stomp(&mut codec, &mut ws_write, &mut pending).await {
                                self.handlers.error(e.to_string());
                                break;
                            }
                            stomp_open = true;
                        }
                        Flow::Open => trace!("Duplicate SockJS open frame"),
                        Flow::Close => break,
                    }
                }

                // Commands from the handle
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Frame(frame)) if !stomp_open => {
                            pending.push(frame);
                        }

                        Some(TransportCommand::Frame(frame)) => {
                            let command = frame.command.clone();
                            if let Err(e) = self.write_frame(&mut codec, &mut ws_write, frame).await {
                                warn!(command = %command, error = %e, "Failed to write frame");
                                self.handlers.error(e.to_string());
                                break;
                            }
                            trace!(command = %command, "Frame sent");
                        }

                        Some(TransportCommand::Shutdown) | None => {
                            debug!("Shutdown requested");
                            if self.shared.connected.load(Ordering::Acquire) {
                                let goodbye = frame::disconnect(DISCONNECT_RECEIPT);
                                if let Err(e) = self.write_frame(&mut codec, &mut ws_write, goodbye).await {
                                    debug!(error = %e, "Failed to send DISCONNECT");
                                }
                            }
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }

                // No CONNECTED in time
                _ = &mut connect_deadline, if !self.shared.connected.load(Ordering::Acquire) => {
                    let timeout_ms = millis(self.connect_timeout);
                    warn!(url = %self.url, timeout_ms, "No CONNECTED before timeout");
                    self.handlers
                        .error(Error::connection_timeout(timeout_ms).to_string());
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }
    }

    /// Sends `CONNECT` and flushes frames queued before it.
    async fn open_stomp(
        &self,
        codec: &mut FrameCodec,
        ws_write: &mut WsSink,
        pending: &mut Vec<Frame>,
    ) -> Result<()> {
        self.write_frame(codec, ws_write, self.connect_frame.clone())
            .await?;
        trace!("CONNECT sent");

        for frame in pending.drain(..) {
            self.write_frame(codec, ws_write, frame).await?;
        }
        Ok(())
    }

    /// Encodes a frame for the current mode and writes it.
    async fn write_frame(
        &self,
        codec: &mut FrameCodec,
        ws_write: &mut WsSink,
        frame: Frame,
    ) -> Result<()> {
        let text = codec.encode(frame)?;
        let payload = match self.mode {
            TransportMode::WebSocket => text,
            TransportMode::SockJs => sockjs::encode_messages(&[text])?,
        };

        ws_write.send(WsMessage::Text(payload.into())).await?;
        Ok(())
    }

    /// Handles one inbound binary message.
    fn handle_binary(&self, codec: &mut FrameCodec, data: &[u8]) -> Flow {
        if self.mode == TransportMode::WebSocket {
            self.handle_stomp(codec, data);
            return Flow::Continue;
        }

        match from_utf8(data) {
            Ok(text) => self.handle_text(codec, text),
            Err(e) => {
                self.handlers
                    .error(Error::protocol(format!("SockJS frame is not UTF-8: {e}")).to_string());
                Flow::Continue
            }
        }
    }

    /// Handles one inbound text message.
    fn handle_text(&self, codec: &mut FrameCodec, text: &str) -> Flow {
        if self.mode == TransportMode::WebSocket {
            self.handle_stomp(codec, text.as_bytes());
            return Flow::Continue;
        }

        match SockJsFrame::parse(text) {
            Ok(SockJsFrame::Open) => {
                debug!("SockJS session open");
                Flow::Open
            }
            Ok(SockJsFrame::Heartbeat) => {
                trace!("SockJS heartbeat");
                Flow::Continue
            }
            Ok(SockJsFrame::Messages(messages)) => {
                for message in &messages {
                    self.handle_stomp(codec, message.as_bytes());
                }
                Flow::Continue
            }
            Ok(SockJsFrame::Close { code, reason }) => {
                info!(code, reason = %reason, "SockJS session closed by server");
                Flow::Close
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse SockJS frame");
                self.handlers.error(e.to_string());
                Flow::Continue
            }
        }
    }

    /// Dispatches every complete STOMP frame in `data`.
    fn handle_stomp(&self, codec: &mut FrameCodec, data: &[u8]) {
        let frames = match codec.decode(data) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Failed to decode STOMP frame");
                self.handlers.error(e.to_string());
                return;
            }
        };

        for frame in frames {
            match frame.command.as_str() {
                frame::CONNECTED => {
                    debug!(version = ?frame.get_header("version"), "STOMP session established");
                    self.shared.connected.store(true, Ordering::Release);
                    self.handlers.connected();
                }
                frame::MESSAGE => self.route_message(frame),
                frame::ERROR => {
                    let cause = error_cause(&frame);
                    warn!(cause = %cause, "Broker sent ERROR");
                    self.handlers.error(cause);
                }
                frame::RECEIPT => {
                    trace!(receipt = ?frame.get_header("receipt-id"), "Receipt");
                }
                other => debug!(command = other, "Ignoring unexpected frame"),
            }
        }
    }

    /// Delivers a `MESSAGE` frame to its subscription's listener.
    fn route_message(&self, frame: Frame) {
        let Some(id) = frame.get_header("subscription").map(SubscriptionId::new) else {
            warn!("MESSAGE without subscription header");
            return;
        };

        let route = self
            .shared
            .routes
            .lock()
            .get(&id)
            .map(|route| (route.destination.clone(), Arc::clone(&route.listener)));

        let Some((subscribed_to, listener)) = route else {
            debug!(subscription = %id, "Message for unknown subscription");
            return;
        };

        let destination = frame
            .get_header("destination")
            .map(str::to_string)
            .unwrap_or(subscribed_to);
        let message_id = frame.get_header("message-id").map(str::to_string);

        let body = match frame::body_text(frame.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(subscription = %id, error = %e, "Dropping MESSAGE");
                self.handlers.error(e.to_string());
                return;
            }
        };

        let message = Message {
            destination,
            subscription: id,
            message_id,
            headers: frame.headers,
            body,
        };

        listener.on_message(message);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the cause string for an ERROR frame.
fn error_cause(frame: &Frame) -> String {
    let summary = frame.get_header("message").unwrap_or("ERROR frame");
    if frame.body.is_empty() {
        Error::broker(summary).to_string()
    } else {
        let details = String::from_utf8_lossy(&frame.body);
        Error::broker(format!("{summary}\n{details}")).to_string()
    }
}

/// A deadline that never fires in practice.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

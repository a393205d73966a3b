//! Inbound messages and the listener capability.
//!
//! A [`Message`] is what a subscription listener receives. The body is an
//! opaque string (commonly JSON) delivered exactly as the broker sent it.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::SubscriptionId;

// ============================================================================
// Message
// ============================================================================

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Destination the message was published to.
    pub destination: String,

    /// Subscription the message was routed through.
    pub subscription: SubscriptionId,

    /// Broker-assigned message ID, if present.
    pub message_id: Option<String>,

    /// All frame headers in wire order.
    pub headers: Vec<(String, String)>,

    /// Message payload, unmodified.
    pub body: String,
}

impl Message {
    /// Creates a message without extra headers.
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        subscription: SubscriptionId,
        body: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            subscription,
            message_id: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns the first header value with the given name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the `content-type` header, if any.
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

// ============================================================================
// MessageListener
// ============================================================================

/// Receives messages for one subscription.
///
/// Invoked by the transport on its own task, never by the session.
/// Implemented for any `Fn(Message) + Send + Sync` closure.
pub trait MessageListener: Send + Sync {
    /// Called once per inbound message.
    fn on_message(&self, message: Message);
}

impl<F> MessageListener for F
where
    F: Fn(Message) + Send + Sync,
{
    fn on_message(&self, message: Message) {
        self(message)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_header_lookup() {
        let mut message = Message::new("/topic/a", SubscriptionId::new("sub-0"), "{}");
        message
            .headers
            .push(("content-type".into(), "application/json".into()));
        message.headers.push(("x".into(), "1".into()));
        message.headers.push(("x".into(), "2".into()));

        assert_eq!(message.content_type(), Some("application/json"));
        assert_eq!(message.header("x"), Some("1"));
        assert_eq!(message.header("missing"), None);
    }

    #[test]
    fn test_closure_listener() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let listener = move |message: Message| sink.lock().push(message.body);

        listener.on_message(Message::new("/topic/a", "sub-0".into(), "hello"));
        assert_eq!(*received.lock(), vec!["hello".to_string()]);
    }
}

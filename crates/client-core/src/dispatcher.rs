//! Typed publish/subscribe dispatcher layered over the raw transport.
//!
//! Inbound frames decode into [`ServerEvent`] and fan out to the handlers
//! registered for that event kind, in registration order. Outbound
//! requests are encoded and forwarded to the transport's send path.
//! Decoupling the transport from domain logic this way lets the connection
//! manager and the sync store subscribe independently, and lets
//! subscriptions be scoped to a component's lifetime.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{trace, warn};

use crate::protocol::{ClientRequest, ServerEvent, ServerEventKind};

/// Destination for encoded outbound frames (the transport's send primitive).
///
/// Sends are best-effort: implementations drop frames silently while the
/// underlying transport is not open.
pub trait FrameSink: Send + Sync {
    /// Hand one raw frame to the transport.
    fn send_frame(&self, raw: String);
}

/// Callback invoked with every decoded event of its subscribed kind.
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Handle identifying one registration; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: ServerEventKind,
    id: u64,
}

/// Publish/subscribe registry keyed by inbound event kind.
///
/// The registry is mutex-guarded so subscribe/unsubscribe may be issued
/// from any task; handlers run outside the lock, in registration order.
pub struct Dispatcher {
    registry: Mutex<HashMap<ServerEventKind, Vec<(u64, EventHandler)>>>,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    next_id: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            sink: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach the transport send path used by [`Dispatcher::publish`].
    pub fn set_sink(&self, sink: Arc<dyn FrameSink>) {
        *self.sink.lock().expect("dispatcher sink lock poisoned") = Some(sink);
    }

    /// Detach the transport send path; later publishes are dropped.
    pub fn clear_sink(&self) {
        *self.sink.lock().expect("dispatcher sink lock poisoned") = None;
    }

    /// Register a handler for one event kind.
    ///
    /// Multiple handlers per kind are permitted; all are invoked, in
    /// registration order, for every matching frame.
    pub fn subscribe(&self, kind: ServerEventKind, handler: EventHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .expect("dispatcher registry lock poisoned")
            .entry(kind)
            .or_default()
            .push((id, handler));
        Subscription { kind, id }
    }

    /// Remove exactly the registration behind `subscription`.
    ///
    /// Removing a handler that was never registered, or was already
    /// removed, is a no-op, never an error.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut registry = self
            .registry
            .lock()
            .expect("dispatcher registry lock poisoned");
        if let Some(handlers) = registry.get_mut(&subscription.kind) {
            handlers.retain(|(id, _)| *id != subscription.id);
            if handlers.is_empty() {
                registry.remove(&subscription.kind);
            }
        }
    }

    /// Decode one raw inbound frame and fan it out.
    ///
    /// Malformed frames and unknown types are logged and dropped; they
    /// never propagate and the connection stays usable. A known kind with
    /// no subscribers is discarded silently.
    pub fn dispatch(&self, raw: &str) {
        let event = match ServerEvent::decode(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                return;
            }
        };

        let handlers: Vec<EventHandler> = {
            let registry = self
                .registry
                .lock()
                .expect("dispatcher registry lock poisoned");
            registry
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            trace!(kind = ?event.kind(), "no subscribers for inbound event");
            return;
        }

        for handler in handlers {
            handler(&event);
        }
    }

    /// Encode an outbound request and forward it to the transport.
    ///
    /// Best-effort: encoding failures and a missing sink are logged and
    /// absorbed, matching the fire-and-forget send contract.
    pub fn publish(&self, request: &ClientRequest) {
        let raw = match request.encode() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "dropping unencodable outbound request");
                return;
            }
        };

        let sink = self
            .sink
            .lock()
            .expect("dispatcher sink lock poisoned")
            .clone();
        match sink {
            Some(sink) => {
                trace!(message_type = request.message_type(), "publishing request");
                sink.send_frame(raw);
            }
            None => trace!(
                message_type = request.message_type(),
                "dropping request: no transport attached"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<String>>,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, raw: String) {
            self.frames
                .lock()
                .expect("recording sink lock poisoned")
                .push(raw);
        }
    }

    fn recording_handler(log: &Arc<StdMutex<Vec<String>>>, label: &str) -> EventHandler {
        let log = Arc::clone(log);
        let label = label.to_owned();
        Arc::new(move |_event| {
            log.lock().expect("handler log lock poisoned").push(label.clone());
        })
    }

    #[test]
    fn invokes_all_handlers_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "first"),
        );
        dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "second"),
        );

        dispatcher.dispatch(r#"{"type":"chat_list_updated","payload":null}"#);

        assert_eq!(
            *log.lock().expect("handler log lock poisoned"),
            vec!["first".to_owned(), "second".to_owned()]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery_to_that_handler_only() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let first = dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "first"),
        );
        dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "second"),
        );

        dispatcher.dispatch(r#"{"type":"chat_list_updated"}"#);
        dispatcher.unsubscribe(&first);
        dispatcher.dispatch(r#"{"type":"chat_list_updated"}"#);

        assert_eq!(
            *log.lock().expect("handler log lock poisoned"),
            vec!["first".to_owned(), "second".to_owned(), "second".to_owned()]
        );
    }

    #[test]
    fn unsubscribing_twice_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sub = dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "only"),
        );

        dispatcher.unsubscribe(&sub);
        dispatcher.unsubscribe(&sub);
        dispatcher.dispatch(r#"{"type":"chat_list_updated"}"#);

        assert!(log.lock().expect("handler log lock poisoned").is_empty());
    }

    #[test]
    fn drops_malformed_and_unknown_frames_without_panicking() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        dispatcher.subscribe(
            ServerEventKind::ChatListUpdated,
            recording_handler(&log, "only"),
        );

        dispatcher.dispatch("not json at all");
        dispatcher.dispatch(r#"{"type":"presence_ping","payload":{}}"#);
        dispatcher.dispatch(r#"{"type":"chat_list_updated"}"#);

        assert_eq!(
            *log.lock().expect("handler log lock poisoned"),
            vec!["only".to_owned()]
        );
    }

    #[test]
    fn publish_forwards_encoded_frames_to_the_sink() {
        let dispatcher = Dispatcher::new();
        let sink = Arc::new(RecordingSink::default());
        dispatcher.set_sink(Arc::clone(&sink) as Arc<dyn FrameSink>);

        dispatcher.publish(&ClientRequest::GetMyChats);
        dispatcher.publish(&ClientRequest::GetChatHistory {
            chat_id: "c1".into(),
        });

        let frames = sink.frames.lock().expect("recording sink lock poisoned");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains(r#""type":"get_my_chats""#));
        assert!(frames[1].contains(r#""chat_id":"c1""#));
    }

    #[test]
    fn publish_without_sink_is_silently_dropped() {
        let dispatcher = Dispatcher::new();
        dispatcher.publish(&ClientRequest::GetMyChats);

        let sink = Arc::new(RecordingSink::default());
        dispatcher.set_sink(Arc::clone(&sink) as Arc<dyn FrameSink>);
        dispatcher.clear_sink();
        dispatcher.publish(&ClientRequest::GetMyChats);

        assert!(
            sink.frames
                .lock()
                .expect("recording sink lock poisoned")
                .is_empty()
        );
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::transport::{ChainTransport, Subscription, TransportError, TransportEvent};
use cm_api_types::TransportKind;

/// Scriptable transport for driving the connection state machine in tests:
/// events are emitted on demand (or on each `connect` call) and requests
/// answer from a canned method → response table.
pub(crate) struct MockTransport {
    kind: TransportKind,
    endpoint: String,
    events_tx: broadcast::Sender<TransportEvent>,
    responses: Mutex<HashMap<String, Value>>,
    connect_events: Mutex<Vec<TransportEvent>>,
    pub(crate) connect_calls: AtomicU32,
    pub(crate) disconnect_calls: AtomicU32,
}

impl MockTransport {
    pub(crate) fn socket(endpoint: &str) -> Self {
        Self::with_kind(TransportKind::Socket, endpoint)
    }

    pub(crate) fn with_kind(kind: TransportKind, endpoint: &str) -> Self {
        let (events_tx, _) = broadcast::channel(64);

        Self {
            kind,
            endpoint: endpoint.to_owned(),
            events_tx,
            responses: Mutex::new(HashMap::new()),
            connect_events: Mutex::new(Vec::new()),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
        }
    }

    /// Events replayed on every `connect` call.
    pub(crate) fn on_connect(&self, events: Vec<TransportEvent>) {
        *self.connect_events.lock().unwrap() = events;
    }

    pub(crate) fn set_response(&self, method: &str, value: Value) {
        self.responses.lock().unwrap().insert(method.to_owned(), value);
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[async_trait::async_trait]
impl ChainTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.connect_events.lock().unwrap().clone();
        for event in scripted {
            self.emit(event);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request(&self, method: &str, _params: Value) -> Result<Value, TransportError> {
        self.responses
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .ok_or_else(|| TransportError::Rpc(format!("no canned response for {method}")))
    }

    async fn subscribe(
        &self,
        _subscribe_method: &str,
        _params: Value,
    ) -> Result<Subscription, TransportError> {
        Err(TransportError::Unsupported("subscription"))
    }

    async fn unsubscribe(
        &self,
        _unsubscribe_method: &str,
        _subscription_id: &str,
    ) -> Result<bool, TransportError> {
        Err(TransportError::Unsupported("subscription"))
    }
}

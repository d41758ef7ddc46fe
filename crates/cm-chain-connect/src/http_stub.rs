use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::transport::{ChainTransport, Subscription, TransportError, TransportEvent};
use cm_api_types::TransportKind;

/// Placeholder transport for EVM networks reached over plain HTTP.
///
/// The endpoint is considered usable as soon as `connect` is called: it
/// reports connected and ready immediately, carries no chain metadata, and
/// rejects the request/subscription surface.
pub struct HttpPlaceholderTransport {
    endpoint: String,
    events_tx: broadcast::Sender<TransportEvent>,
    connected: AtomicBool,
}

impl HttpPlaceholderTransport {
    pub fn new(endpoint: String) -> Self {
        let (events_tx, _) = broadcast::channel(8);

        Self {
            endpoint,
            events_tx,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl ChainTransport for HttpPlaceholderTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::HttpPlaceholder
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("http placeholder for {} marked ready", self.endpoint);
        let _ = self.events_tx.send(TransportEvent::Connected);
        let _ = self.events_tx.send(TransportEvent::Ready);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn request(&self, _method: &str, _params: Value) -> Result<Value, TransportError> {
        Err(TransportError::Unsupported("rpc request"))
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

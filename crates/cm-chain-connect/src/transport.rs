use async_trait::async_trait;
use cm_api_types::TransportKind;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no active connection")]
    NotConnected,
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("response channel closed before a reply arrived")]
    ChannelClosed,
    #[error("connection terminated after retry exhaustion")]
    RetryExhausted,
}

/// Lifecycle events every transport emits, applied by the connection
/// handle in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Ready,
    Error(String),
}

/// A live RPC subscription. Updates stop arriving when the link drops;
/// the id stays valid for an explicit `unsubscribe` call.
pub struct Subscription {
    pub id: String,
    pub updates: mpsc::UnboundedReceiver<Value>,
}

/// Common capability surface over the socket, light-client and HTTP
/// placeholder transports. Each connection handle owns exactly one
/// transport instance; transports are never shared between handles.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn endpoint(&self) -> &str;

    /// Subscribe to lifecycle events. Must be called before `connect`
    /// to observe the initial transition.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Begin establishing the link. Returns once establishment has been
    /// initiated; progress is reported through the event stream.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the link down and stop any internal reconnect attempts.
    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    async fn subscribe(
        &self,
        subscribe_method: &str,
        params: Value,
    ) -> Result<Subscription, TransportError>;

    async fn unsubscribe(
        &self,
        unsubscribe_method: &str,
        subscription_id: &str,
    ) -> Result<bool, TransportError>;
}

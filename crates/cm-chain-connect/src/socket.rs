use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::presets::TypePreset;
use crate::transport::{ChainTransport, Subscription, TransportError, TransportEvent};
use cm_api_types::TransportKind;

/// Delay between automatic reconnect attempts while the link is down.
pub const AUTO_CONNECT_MS: u64 = 3_000;

const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

type PendingReply = oneshot::Sender<Result<Value, TransportError>>;

struct SocketShared {
    endpoint: String,
    events_tx: broadcast::Sender<TransportEvent>,
    // tokio Mutex because the sink is held across .await points when sending
    sink: Mutex<Option<WsSink>>,
    pending: std::sync::Mutex<HashMap<u64, PendingReply>>,
    subscriptions: std::sync::Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

/// JSON-RPC transport over a WebSocket link.
///
/// The connect loop keeps retrying on a fixed delay until `disconnect` is
/// called; every transition is reported through the event channel so the
/// owning connection handle can apply its retry policy.
pub struct SocketTransport {
    shared: Arc<SocketShared>,
    preset: TypePreset,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SocketTransport {
    pub fn new(endpoint: String, preset: TypePreset) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(SocketShared {
                endpoint,
                events_tx,
                sink: Mutex::new(None),
                pending: std::sync::Mutex::new(HashMap::new()),
                subscriptions: std::sync::Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                connected: AtomicBool::new(false),
            }),
            preset,
            shutdown_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn preset(&self) -> TypePreset {
        self.preset
    }
}

impl SocketShared {
    fn emit(&self, event: TransportEvent) {
        // send only fails when nobody is listening, which is fine
        let _ = self.events_tx.send(event);
    }

    fn with_pending<R>(&self, f: impl FnOnce(&mut HashMap<u64, PendingReply>) -> R) -> R {
        let mut guard = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn with_subscriptions<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, mpsc::UnboundedSender<Value>>) -> R,
    ) -> R {
        let mut guard = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Drop session-scoped state after the link goes away: every caller
    /// still waiting on a reply gets an error instead of hanging.
    async fn teardown_session(&self) {
        self.connected.store(false, Ordering::SeqCst);

        let sink = { self.sink.lock().await.take() };
        if let Some(mut sink) = sink {
            if let Err(err) = sink.close().await {
                debug!("error closing sink for {}: {}", self.endpoint, err);
            }
        }

        let waiters = self.with_pending(std::mem::take);
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(TransportError::NotConnected));
        }

        self.with_subscriptions(|subs| subs.clear());
    }

    fn route_incoming(&self, text: &str) {
        let parsed: IncomingFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("unparseable frame from {}: {}", self.endpoint, err);
                return;
            }
        };

        if let Some(id) = parsed.id {
            let Some(waiter) = self.with_pending(|pending| pending.remove(&id)) else {
                debug!("reply for unknown request id {} from {}", id, self.endpoint);
                return;
            };

            let outcome = match parsed.error {
                Some(err) => Err(TransportError::Rpc(format!(
                    "{} (code {})",
                    err.message, err.code
                ))),
                None => Ok(parsed.result.unwrap_or(Value::Null)),
            };

            let _ = waiter.send(outcome);
        } else if let (Some(_), Some(params)) = (parsed.method, parsed.params) {
            let key = subscription_id_key(&params.subscription);
            let delivered = self.with_subscriptions(|subs| {
                subs.get(&key)
                    .map(|updates| updates.send(params.result.clone()).is_ok())
            });

            if delivered != Some(true) {
                debug!("dropping update for unknown subscription {}", key);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IncomingFrame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<IncomingError>,
    method: Option<String>,
    params: Option<IncomingSubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct IncomingError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct IncomingSubscriptionParams {
    subscription: Value,
    result: Value,
}

fn subscription_id_key(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

async fn connection_loop(
    shared: Arc<SocketShared>,
    mut shutdown_rx: oneshot::Receiver<()>,
    preset: TypePreset,
) {
    info!(
        "connecting to {} with the {} extension set",
        shared.endpoint,
        preset.as_str()
    );

    'outer: loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break 'outer;
            }

            result = connect_async(&shared.endpoint) => {
                match result {
                    Ok((ws, _)) => {
                        info!("socket connected to {}", shared.endpoint);

                        let (sink, mut stream) = ws.split();
                        {
                            *shared.sink.lock().await = Some(sink);
                        }
                        shared.connected.store(true, Ordering::SeqCst);
                        shared.emit(TransportEvent::Connected);
                        shared.emit(TransportEvent::Ready);

                        loop {
                            tokio::select! {
                                _ = &mut shutdown_rx => {
                                    shared.teardown_session().await;
                                    break 'outer;
                                }
                                message = stream.next() => {
                                    match message {
                                        Some(Ok(Message::Text(text))) => {
                                            shared.route_incoming(text.as_str());
                                        }
                                        // tungstenite answers pings automatically
                                        Some(Ok(Message::Ping(_))) => {}
                                        Some(Ok(Message::Close(_))) => {
                                            info!("socket closed gracefully by {}", shared.endpoint);
                                            break;
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(err)) => {
                                            warn!("socket error from {}: {}", shared.endpoint, err);
                                            shared.emit(TransportEvent::Error(err.to_string()));
                                            break;
                                        }
                                        None => {
                                            info!("socket disconnected from {}", shared.endpoint);
                                            break;
                                        }
                                    }
                                }
                            }
                        }

                        shared.teardown_session().await;
                        shared.emit(TransportEvent::Disconnected);
                    }
                    Err(err) => {
                        warn!("connect error to {}: {}", shared.endpoint, err);
                        shared.emit(TransportEvent::Error(err.to_string()));
                        shared.emit(TransportEvent::Disconnected);
                    }
                }
            }
        }

        // fixed auto-connect delay before the next attempt
        tokio::select! {
            _ = &mut shutdown_rx => break 'outer,
            _ = tokio::time::sleep(Duration::from_millis(AUTO_CONNECT_MS)) => {}
        }
    }

    debug!("socket loop for {} exited", shared.endpoint);
}

#[async_trait::async_trait]
impl ChainTransport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events_tx.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let mut shutdown_slot = self.shutdown_tx.lock().await;
        if shutdown_slot.is_some() {
            // loop already running
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *shutdown_slot = Some(shutdown_tx);

        let handle = tokio::spawn(connection_loop(self.shared.clone(), shutdown_rx, self.preset));
        *self.loop_handle.lock().await = Some(handle);

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let shutdown_tx = self.shutdown_tx.lock().await.take();
        if let Some(shutdown_tx) = shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        // close the live sink so the read half unblocks promptly
        let sink = { self.shared.sink.lock().await.take() };
        if let Some(mut sink) = sink {
            let _ = sink.close().await;
        }

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_millis(500), handle)
                .await
                .is_err()
            {
                warn!("socket loop for {} did not shut down in time", self.shared.endpoint);
            }
        }

        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.with_pending(|pending| pending.insert(id, reply_tx));

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        let send_result = {
            let mut guard = self.shared.sink.lock().await;
            match guard.as_mut() {
                Some(sink) => sink
                    .send(Message::Text(frame.into()))
                    .await
                    .map_err(|err| TransportError::Rpc(err.to_string())),
                None => Err(TransportError::NotConnected),
            }
        };

        if let Err(err) = send_result {
            self.shared.with_pending(|pending| pending.remove(&id));
            return Err(err);
        }

        reply_rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    async fn subscribe(
        &self,
        subscribe_method: &str,
        params: Value,
    ) -> Result<Subscription, TransportError> {
        let reply = self.request(subscribe_method, params).await?;
        let id = subscription_id_key(&reply);

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        self.shared
            .with_subscriptions(|subs| subs.insert(id.clone(), updates_tx));

        Ok(Subscription {
            id,
            updates: updates_rx,
        })
    }

    async fn unsubscribe(
        &self,
        unsubscribe_method: &str,
        subscription_id: &str,
    ) -> Result<bool, TransportError> {
        self.shared
            .with_subscriptions(|subs| subs.remove(subscription_id));

        let reply = self
            .request(unsubscribe_method, serde_json::json!([subscription_id]))
            .await?;

        Ok(reply.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared() -> Arc<SocketShared> {
        SocketTransport::new("wss://example.test".to_owned(), TypePreset::Standard).shared
    }

    #[tokio::test]
    async fn reply_completes_the_matching_pending_request() -> anyhow::Result<()> {
        let shared = shared();
        let (reply_tx, reply_rx) = oneshot::channel();
        shared.with_pending(|pending| pending.insert(7, reply_tx));

        shared.route_incoming(r#"{"jsonrpc":"2.0","id":7,"result":{"ss58Format":2}}"#);

        let reply = reply_rx.await??;
        assert_eq!(reply, json!({"ss58Format": 2}));
        Ok(())
    }

    #[tokio::test]
    async fn error_reply_surfaces_as_rpc_error() -> anyhow::Result<()> {
        let shared = shared();
        let (reply_tx, reply_rx) = oneshot::channel();
        shared.with_pending(|pending| pending.insert(3, reply_tx));

        shared.route_incoming(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#,
        );

        let reply = reply_rx.await?;
        assert!(matches!(reply, Err(TransportError::Rpc(message)) if message.contains("Method not found")));
        Ok(())
    }

    #[tokio::test]
    async fn subscription_updates_reach_the_registered_channel() {
        let shared = shared();
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        shared.with_subscriptions(|subs| subs.insert("abc123".to_owned(), updates_tx));

        shared.route_incoming(
            r#"{"jsonrpc":"2.0","method":"chain_newHead","params":{"subscription":"abc123","result":{"number":"0x10"}}}"#,
        );

        let update = updates_rx.try_recv().expect("update should be delivered");
        assert_eq!(update, json!({"number": "0x10"}));
    }

    #[tokio::test]
    async fn unknown_ids_and_garbage_frames_are_tolerated() {
        let shared = shared();
        shared.route_incoming(r#"{"jsonrpc":"2.0","id":99,"result":null}"#);
        shared.route_incoming("not json at all");
    }

    #[tokio::test]
    async fn teardown_fails_outstanding_requests() {
        let shared = shared();
        let (reply_tx, reply_rx) = oneshot::channel();
        shared.with_pending(|pending| pending.insert(1, reply_tx));

        shared.teardown_session().await;

        let reply = reply_rx.await.expect("waiter should receive an error");
        assert!(matches!(reply, Err(TransportError::NotConnected)));
    }
}

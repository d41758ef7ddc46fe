use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metadata::MetadataLoader;
use crate::policy::{ReconnectPolicy, RetryDecision};
use crate::transport::{ChainTransport, TransportError, TransportEvent};
use cm_api_types::{ConnectionPhase, ConnectionSnapshot, NetworkKey, TransportKind};

/// Per-endpoint connection wrapper.
///
/// Owns exactly one transport, applies its lifecycle events to a state
/// snapshot in receipt order, and re-emits every transition through a watch
/// channel. `ready` is always the conjunction of `connected` and
/// `initialized`; it is recomputed in one place and never set directly.
pub struct ConnectionHandle {
    network_key: NetworkKey,
    transport: Arc<dyn ChainTransport>,
    state: Arc<watch::Sender<ConnectionSnapshot>>,
    recover_gate: Mutex<()>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionHandle {
    /// Starts establishing the connection and returns immediately; progress
    /// is observable through `subscribe` / `await_ready`.
    pub fn create(
        network_key: NetworkKey,
        transport: Arc<dyn ChainTransport>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let snapshot = ConnectionSnapshot::initial(
            network_key.clone(),
            transport.endpoint().to_owned(),
            transport.kind(),
        );
        let state = Arc::new(watch::channel(snapshot).0);

        // subscribe before the first connect so no transition is missed
        let events = transport.events();
        let driver = tokio::spawn(drive(
            network_key.clone(),
            transport.clone(),
            state.clone(),
            policy,
            events,
        ));

        Arc::new(Self {
            network_key,
            transport,
            state,
            recover_gate: Mutex::new(()),
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn network_key(&self) -> &NetworkKey {
        &self.network_key
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state.borrow().clone()
    }

    /// Watch every lifecycle transition of this connection.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state.subscribe()
    }

    /// Suspends until the connection is ready and returns the populated
    /// state. Deliberately carries no timeout; callers that need a bound
    /// wrap this in `tokio::time::timeout`.
    pub async fn await_ready(&self) -> Result<ConnectionSnapshot, TransportError> {
        let mut receiver = self.state.subscribe();
        let snapshot = receiver
            .wait_for(|snapshot| snapshot.ready)
            .await
            .map_err(|_| TransportError::ChannelClosed)?;

        Ok(snapshot.clone())
    }

    /// Caller-triggered reconnect: resets the retry counter, then tears the
    /// transport down and re-establishes it. Overlapping calls serialize on
    /// a per-handle gate. Light-client transports manage their own session
    /// lifecycle, so this is a no-op for them.
    pub async fn recover_connect(&self) -> Result<(), TransportError> {
        let _guard = self.recover_gate.lock().await;

        if self.snapshot().phase == ConnectionPhase::Terminated {
            return Err(TransportError::RetryExhausted);
        }

        if self.transport.kind() == TransportKind::LightClient {
            return Ok(());
        }

        info!("recover connect to {}", self.transport.endpoint());
        self.state.send_modify(|snapshot| snapshot.retry_count = 0);
        self.transport.disconnect().await?;
        self.transport.connect().await
    }

    /// Tears the transport down and stops the event driver.
    pub async fn dispose(&self) {
        if let Err(err) = self.transport.disconnect().await {
            debug!("error disconnecting {}: {}", self.transport.endpoint(), err);
        }

        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
    }
}

fn apply_ready_invariant(snapshot: &mut ConnectionSnapshot) {
    snapshot.ready = snapshot.connected && snapshot.initialized;
    if snapshot.ready && snapshot.phase != ConnectionPhase::Terminated {
        snapshot.phase = ConnectionPhase::Ready;
    }
}

async fn drive(
    network_key: NetworkKey,
    transport: Arc<dyn ChainTransport>,
    state: Arc<watch::Sender<ConnectionSnapshot>>,
    policy: ReconnectPolicy,
    mut events: broadcast::Receiver<TransportEvent>,
) {
    state.send_modify(|snapshot| snapshot.phase = ConnectionPhase::Connecting);

    if let Err(err) = transport.connect().await {
        warn!("{}: initial connect failed: {}", network_key.0, err);
        state.send_modify(|snapshot| {
            snapshot.last_error = Some(err.to_string());
            snapshot.phase = ConnectionPhase::Disconnected;
        });
    }

    loop {
        match events.recv().await {
            Ok(TransportEvent::Connected) => {
                info!("{} connected to {}", network_key.0, transport.endpoint());
                state.send_modify(|snapshot| {
                    snapshot.connected = true;
                    snapshot.retry_count = 0;
                    snapshot.phase = ConnectionPhase::Connected;
                    apply_ready_invariant(snapshot);
                });
            }

            Ok(TransportEvent::Ready) => {
                // loaded at most once per connect cycle; partial failures
                // inside resolve to defaults, never to an error state
                let metadata = MetadataLoader::load(transport.as_ref()).await;
                debug!(
                    "{} metadata loaded: chain={} spec={}/{}",
                    network_key.0, metadata.system_chain, metadata.spec_name, metadata.spec_version
                );
                state.send_modify(|snapshot| {
                    snapshot.metadata = Some(metadata);
                    snapshot.initialized = true;
                    apply_ready_invariant(snapshot);
                });
            }

            Ok(TransportEvent::Disconnected) => {
                let mut retry_count = 0;
                state.send_modify(|snapshot| {
                    snapshot.connected = false;
                    snapshot.retry_count += 1;
                    retry_count = snapshot.retry_count;
                    snapshot.phase = ConnectionPhase::Disconnected;
                    apply_ready_invariant(snapshot);
                });
                info!(
                    "{} disconnected from {} ({} consecutive)",
                    network_key.0,
                    transport.endpoint(),
                    retry_count
                );

                if policy.evaluate(retry_count) == RetryDecision::Stop {
                    info!(
                        "abandoning {} after {} consecutive disconnects",
                        network_key.0, retry_count
                    );
                    if let Err(err) = transport.disconnect().await {
                        debug!("teardown error for {}: {}", transport.endpoint(), err);
                    }
                    state.send_modify(|snapshot| {
                        snapshot.phase = ConnectionPhase::Terminated;
                        apply_ready_invariant(snapshot);
                    });
                    break;
                }
            }

            Ok(TransportEvent::Error(message)) => {
                warn!("{} transport error: {}", network_key.0, message);
                state.send_modify(|snapshot| snapshot.last_error = Some(message));
            }

            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("{} event stream lagged by {}", network_key.0, skipped);
            }

            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    debug!("{} event driver stopped", network_key.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MAX_CONTINUE_RETRY;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn key(name: &str) -> NetworkKey {
        NetworkKey(name.to_owned())
    }

    async fn wait_for(
        handle: &ConnectionHandle,
        predicate: impl FnMut(&ConnectionSnapshot) -> bool,
    ) -> ConnectionSnapshot {
        let mut receiver = handle.subscribe();
        timeout(WAIT, receiver.wait_for(predicate))
            .await
            .expect("timed out waiting for state transition")
            .expect("state channel closed")
            .clone()
    }

    #[tokio::test]
    async fn ready_is_the_conjunction_of_connected_and_initialized() {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        let handle = ConnectionHandle::create(
            key("polkadot"),
            transport.clone(),
            ReconnectPolicy::default(),
        );

        transport.emit(TransportEvent::Connected);
        let snapshot = wait_for(&handle, |s| s.connected).await;
        assert!(!snapshot.ready, "connected alone must not be ready");
        assert!(!snapshot.initialized);

        transport.emit(TransportEvent::Ready);
        let snapshot = wait_for(&handle, |s| s.ready).await;
        assert!(snapshot.connected && snapshot.initialized);
        assert_eq!(snapshot.phase, ConnectionPhase::Ready);
    }

    #[tokio::test]
    async fn connect_and_metadata_yield_a_populated_ready_state() -> anyhow::Result<()> {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        transport.on_connect(vec![TransportEvent::Connected, TransportEvent::Ready]);
        transport.set_response("system_chain", json!("Polkadot"));
        transport.set_response(
            "state_getRuntimeVersion",
            json!({"specName": "polkadot", "specVersion": 1000000}),
        );

        let handle = ConnectionHandle::create(
            key("polkadot"),
            transport.clone(),
            ReconnectPolicy::default(),
        );

        let snapshot = timeout(WAIT, handle.await_ready()).await??;
        assert!(snapshot.ready);
        assert_eq!(snapshot.retry_count, 0);
        let metadata = snapshot.metadata.expect("metadata populated on ready");
        assert_eq!(metadata.spec_name, "polkadot");
        assert_eq!(metadata.system_chain, "Polkadot");
        Ok(())
    }

    #[tokio::test]
    async fn retry_count_increments_per_disconnect_and_resets_on_connect() {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        let handle = ConnectionHandle::create(
            key("kusama"),
            transport.clone(),
            ReconnectPolicy::default(),
        );

        transport.emit(TransportEvent::Disconnected);
        let snapshot = wait_for(&handle, |s| s.retry_count == 1).await;
        assert!(!snapshot.connected && !snapshot.ready);

        transport.emit(TransportEvent::Disconnected);
        wait_for(&handle, |s| s.retry_count == 2).await;

        transport.emit(TransportEvent::Connected);
        let snapshot = wait_for(&handle, |s| s.connected).await;
        assert_eq!(snapshot.retry_count, 0);
    }

    #[tokio::test]
    async fn retry_exhaustion_terminates_and_tears_down_exactly_once() {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        let handle = ConnectionHandle::create(
            key("kusama"),
            transport.clone(),
            ReconnectPolicy::default(),
        );

        for _ in 0..(MAX_CONTINUE_RETRY + 1) {
            transport.emit(TransportEvent::Disconnected);
        }

        let snapshot = wait_for(&handle, |s| s.phase == ConnectionPhase::Terminated).await;
        assert!(!snapshot.ready);
        assert_eq!(snapshot.retry_count, MAX_CONTINUE_RETRY + 1);
        assert_eq!(transport.disconnect_calls.load(Ordering::SeqCst), 1);

        // the driver is gone: later events no longer move the state
        transport.emit(TransportEvent::Connected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.snapshot().phase, ConnectionPhase::Terminated);

        // and recovery is refused
        let recovered = handle.recover_connect().await;
        assert!(matches!(recovered, Err(TransportError::RetryExhausted)));
    }

    #[tokio::test]
    async fn recover_connect_cycles_back_to_ready() -> anyhow::Result<()> {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        transport.on_connect(vec![TransportEvent::Connected, TransportEvent::Ready]);

        let handle = ConnectionHandle::create(
            key("acala"),
            transport.clone(),
            ReconnectPolicy::default(),
        );
        timeout(WAIT, handle.await_ready()).await??;

        handle.recover_connect().await?;

        let snapshot = timeout(WAIT, handle.await_ready()).await??;
        assert!(snapshot.ready);
        assert_eq!(snapshot.retry_count, 0);
        assert_eq!(transport.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn recover_connect_is_a_noop_for_light_clients() -> anyhow::Result<()> {
        let transport = Arc::new(MockTransport::with_kind(
            TransportKind::LightClient,
            "light://substrate-connect/kusama",
        ));
        let handle = ConnectionHandle::create(
            key("kusama"),
            transport.clone(),
            ReconnectPolicy::default(),
        );
        // let the driver run its initial connect
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.recover_connect().await?;

        assert_eq!(transport.disconnect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn transport_errors_surface_in_the_state_record() {
        let transport = Arc::new(MockTransport::socket("wss://node.test"));
        let handle = ConnectionHandle::create(
            key("astar"),
            transport.clone(),
            ReconnectPolicy::default(),
        );

        transport.emit(TransportEvent::Error("1010: invalid transaction".to_owned()));

        let snapshot = wait_for(&handle, |s| s.last_error.is_some()).await;
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("1010: invalid transaction")
        );
        // errors alone never flip readiness
        assert!(!snapshot.ready);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::handle::ConnectionHandle;
use crate::http_stub::HttpPlaceholderTransport;
use crate::light_client::{LIGHT_ENDPOINT_PREFIX, LightClientEngine, LightClientTransport};
use crate::policy::ReconnectPolicy;
use crate::presets::TypePreset;
use crate::socket::SocketTransport;
use crate::transport::{ChainTransport, TransportError};
use cm_api_types::{ConnectionPhase, ConnectionSnapshot, NetworkKey};

/// Per-network construction inputs, resolved once before the transport is
/// built rather than re-checked at call sites.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub is_ethereum: bool,
    pub light_client_engine: Option<Arc<dyn LightClientEngine>>,
}

pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        network_key: &NetworkKey,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn ChainTransport>, TransportError>;
}

/// Resolves the endpoint scheme to a transport kind: `light://` spec
/// references, HTTP placeholders for EVM networks, sockets otherwise.
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn build(
        &self,
        network_key: &NetworkKey,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn ChainTransport>, TransportError> {
        if endpoint.starts_with(LIGHT_ENDPOINT_PREFIX) {
            let engine = options
                .light_client_engine
                .clone()
                .ok_or(TransportError::Unsupported(
                    "light-client endpoint without an engine",
                ))?;

            return Ok(Arc::new(LightClientTransport::new(
                endpoint.to_owned(),
                engine,
            )?));
        }

        if options.is_ethereum && endpoint.starts_with("http") {
            return Ok(Arc::new(HttpPlaceholderTransport::new(endpoint.to_owned())));
        }

        if endpoint.starts_with("ws") {
            return Ok(Arc::new(SocketTransport::new(
                endpoint.to_owned(),
                TypePreset::for_network(network_key),
            )));
        }

        Err(TransportError::InvalidEndpoint(endpoint.to_owned()))
    }
}

/// Maps network key → live connection handle, at most one per key.
///
/// An explicit instance injected at call sites rather than process-global
/// state, so services and tests control its lifetime and teardown.
pub struct ConnectionRegistry {
    policy: ReconnectPolicy,
    factory: Arc<dyn TransportFactory>,
    entries: RwLock<HashMap<NetworkKey, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self::with_factory(policy, Arc::new(DefaultTransportFactory))
    }

    pub fn with_factory(policy: ReconnectPolicy, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            policy,
            factory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the existing handle for the key while it is live; a missing
    /// or terminated entry gets a freshly constructed replacement.
    pub async fn get_or_create(
        &self,
        network_key: NetworkKey,
        endpoint: &str,
        options: ConnectOptions,
    ) -> Result<Arc<ConnectionHandle>, TransportError> {
        {
            let entries = self.entries.read().await;
            if let Some(existing) = entries.get(&network_key) {
                if existing.snapshot().phase != ConnectionPhase::Terminated {
                    return Ok(existing.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&network_key) {
            if existing.snapshot().phase != ConnectionPhase::Terminated {
                return Ok(existing.clone());
            }
        }

        let transport = self.factory.build(&network_key, endpoint, &options)?;
        info!("creating connection for {} at {}", network_key.0, endpoint);
        let handle = ConnectionHandle::create(network_key.clone(), transport, self.policy);
        entries.insert(network_key, handle.clone());

        Ok(handle)
    }

    pub async fn get(&self, network_key: &NetworkKey) -> Option<Arc<ConnectionHandle>> {
        self.entries.read().await.get(network_key).cloned()
    }

    pub async fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.entries
            .read()
            .await
            .values()
            .map(|handle| handle.snapshot())
            .collect()
    }

    /// Tears down every tracked connection; used at shutdown.
    pub async fn remove_all(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.write().await;
            entries.drain().collect()
        };

        for (network_key, handle) in drained {
            info!("removing connection for {}", network_key.0);
            handle.dispose().await;
        }
    }
}

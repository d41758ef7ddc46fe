use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, info};

use crate::transport::{ChainTransport, Subscription, TransportError, TransportEvent};
use cm_api_types::TransportKind;

pub const LIGHT_ENDPOINT_PREFIX: &str = "light://substrate-connect/";

/// Relay chains with embedded well-known specs.
pub const RELAY_CHAIN_SPECS: [(&str, &str); 4] = [
    ("kusama", "ksmcc3"),
    ("polkadot", "polkadot"),
    ("rococo", "rococo_v2_2"),
    ("westend", "westend2"),
];

const PARA_SPEC_SOURCE: &str =
    "https://raw.githubusercontent.com/polkadot-js/apps/master/packages/react-api/src/light/";

/// Parachains whose spec files are fetched from the published spec folder.
pub const PARA_CHAIN_SPECS: [&str; 3] = ["kusama/shiden", "kusama/tinkernet", "polkadot/astar"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightEndpoint {
    pub relay: String,
    pub para: Option<String>,
}

impl LightEndpoint {
    /// Parses `light://substrate-connect/<relay>[/<para>]`.
    pub fn parse(endpoint: &str) -> Result<Self, TransportError> {
        let Some(spec_link) = endpoint.strip_prefix(LIGHT_ENDPOINT_PREFIX) else {
            return Err(TransportError::InvalidEndpoint(endpoint.to_owned()));
        };

        let mut parts = spec_link.splitn(2, '/');
        let relay = parts.next().unwrap_or_default();
        if relay.is_empty() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_owned()));
        }

        if !RELAY_CHAIN_SPECS.iter().any(|(name, _)| *name == relay) {
            return Err(TransportError::InvalidEndpoint(endpoint.to_owned()));
        }

        Ok(Self {
            relay: relay.to_owned(),
            para: parts.next().filter(|para| !para.is_empty()).map(ToOwned::to_owned),
        })
    }

    pub fn spec_link(&self) -> String {
        match &self.para {
            Some(para) => format!("{}/{}", self.relay, para),
            None => self.relay.clone(),
        }
    }
}

/// Spec material handed to the light-client engine: a well-known relay spec
/// id plus, for parachains, the fetched spec file contents.
#[derive(Debug, Clone)]
pub struct ResolvedLightSpec {
    pub relay_spec_id: String,
    pub para_spec_json: Option<String>,
}

pub async fn resolve_spec(
    endpoint: &LightEndpoint,
    http: &reqwest::Client,
) -> Result<ResolvedLightSpec, TransportError> {
    let relay_spec_id = RELAY_CHAIN_SPECS
        .iter()
        .find(|(name, _)| *name == endpoint.relay)
        .map(|(_, spec)| (*spec).to_owned())
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.relay.clone()))?;

    let para_spec_json = match &endpoint.para {
        None => None,
        Some(_) => {
            let spec_link = endpoint.spec_link();
            if !PARA_CHAIN_SPECS.contains(&spec_link.as_str()) {
                return Err(TransportError::InvalidEndpoint(spec_link));
            }

            let url = format!("{}{}.json", PARA_SPEC_SOURCE, spec_link);
            debug!("fetching parachain spec from {}", url);

            let spec = http
                .get(&url)
                .send()
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?
                .error_for_status()
                .map_err(|err| TransportError::Connect(err.to_string()))?
                .text()
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;

            Some(spec)
        }
    };

    Ok(ResolvedLightSpec {
        relay_spec_id,
        para_spec_json,
    })
}

/// Builds the in-process light-client session for a resolved spec. The
/// engine itself is an external collaborator; it is injected where light
/// endpoints are in use.
#[async_trait::async_trait]
pub trait LightClientEngine: Send + Sync {
    async fn build(
        &self,
        spec: ResolvedLightSpec,
    ) -> Result<Arc<dyn ChainTransport>, TransportError>;
}

/// Light-client transport that resolves its spec and engine session lazily.
///
/// Calls arriving before the session exists wait for it; once the inner
/// transport resolves, its lifecycle events are piped through so the owning
/// handle observes a single uninterrupted stream.
pub struct LightClientTransport {
    endpoint_url: String,
    light: LightEndpoint,
    engine: Arc<dyn LightClientEngine>,
    http: reqwest::Client,
    events_tx: broadcast::Sender<TransportEvent>,
    inner: OnceCell<Arc<dyn ChainTransport>>,
}

impl LightClientTransport {
    pub fn new(endpoint_url: String, engine: Arc<dyn LightClientEngine>) -> Result<Self, TransportError> {
        let light = LightEndpoint::parse(&endpoint_url)?;
        let (events_tx, _) = broadcast::channel(64);

        Ok(Self {
            endpoint_url,
            light,
            engine,
            http: reqwest::Client::new(),
            events_tx,
            inner: OnceCell::new(),
        })
    }

    async fn inner(&self) -> Result<&Arc<dyn ChainTransport>, TransportError> {
        self.inner
            .get_or_try_init(|| async {
                let spec = resolve_spec(&self.light, &self.http).await?;
                info!("light-client session starting for {}", self.light.spec_link());

                let inner = self.engine.build(spec).await?;

                let mut inner_events = inner.events();
                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match inner_events.recv().await {
                            Ok(event) => {
                                let _ = events_tx.send(event);
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!("light-client event stream lagged by {}", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });

                Ok(inner)
            })
            .await
    }
}

#[async_trait::async_trait]
impl ChainTransport for LightClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LightClient
    }

    fn endpoint(&self) -> &str {
        &self.endpoint_url
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.inner().await?.connect().await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        match self.inner.get() {
            Some(inner) => inner.disconnect().await,
            None => Ok(()),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.inner().await?.request(method, params).await
    }

    async fn subscribe(
        &self,
        subscribe_method: &str,
        params: Value,
    ) -> Result<Subscription, TransportError> {
        self.inner().await?.subscribe(subscribe_method, params).await
    }

    async fn unsubscribe(
        &self,
        unsubscribe_method: &str,
        subscription_id: &str,
    ) -> Result<bool, TransportError> {
        self.inner()
            .await?
            .unsubscribe(unsubscribe_method, subscription_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relay_only_endpoints() {
        let endpoint = LightEndpoint::parse("light://substrate-connect/kusama").unwrap();
        assert_eq!(endpoint.relay, "kusama");
        assert_eq!(endpoint.para, None);
        assert_eq!(endpoint.spec_link(), "kusama");
    }

    #[test]
    fn parses_relay_para_endpoints() {
        let endpoint = LightEndpoint::parse("light://substrate-connect/kusama/shiden").unwrap();
        assert_eq!(endpoint.relay, "kusama");
        assert_eq!(endpoint.para.as_deref(), Some("shiden"));
        assert_eq!(endpoint.spec_link(), "kusama/shiden");
    }

    #[test]
    fn rejects_other_schemes_and_unknown_relays() {
        assert!(LightEndpoint::parse("wss://rpc.polkadot.io").is_err());
        assert!(LightEndpoint::parse("light://substrate-connect/").is_err());
        assert!(LightEndpoint::parse("light://substrate-connect/solana").is_err());
    }
}

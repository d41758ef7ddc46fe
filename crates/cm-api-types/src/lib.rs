use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NetworkKey(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Socket,
    LightClient,
    HttpPlaceholder,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Terminated,
}

/// Chain-descriptive fields fetched once per connect cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainMetadata {
    pub spec_name: String,
    pub spec_version: String,
    pub system_chain: String,
    pub system_chain_type: String,
    pub system_name: String,
    pub system_version: String,
    pub token_symbol: Vec<String>,
    pub token_decimals: Vec<u32>,
    pub ss58_format: u16,
}

/// Per-endpoint connection state, re-emitted on every lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub network_key: NetworkKey,
    pub endpoint_url: String,
    pub transport_kind: TransportKind,
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub initialized: bool,
    pub ready: bool,
    pub retry_count: u32,
    pub metadata: Option<ChainMetadata>,
    pub last_error: Option<String>,
}

impl ConnectionSnapshot {
    pub fn initial(network_key: NetworkKey, endpoint_url: String, transport_kind: TransportKind) -> Self {
        Self {
            network_key,
            endpoint_url,
            transport_kind,
            phase: ConnectionPhase::Disconnected,
            connected: false,
            initialized: false,
            ready: false,
            retry_count: 0,
            metadata: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Native,
    Token,
    NftCollection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub slug: String,
    pub chain: String,
    pub symbol: String,
    pub decimals: u32,
    pub asset_type: AssetType,
    pub min_amount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftCollectionRecord {
    pub chain: String,
    pub collection_id: String,
    pub collection_name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingRewardRecord {
    pub chain: String,
    pub address: String,
    pub latest_reward: String,
    pub total_reward: String,
    pub total_slash: String,
    pub unclaimed_reward: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub key: NetworkKey,
    pub endpoint: String,
    pub is_ethereum: bool,
}

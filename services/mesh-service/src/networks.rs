use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

/// One configured network endpoint. The service connects to every entry at
/// startup; the registry keeps at most one live connection per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NetworkEntry {
    pub(crate) key: String,
    pub(crate) endpoint: String,
    #[serde(default)]
    pub(crate) is_ethereum: bool,
}

fn entry(key: &str, endpoint: &str) -> NetworkEntry {
    NetworkEntry {
        key: key.to_owned(),
        endpoint: endpoint.to_owned(),
        is_ethereum: false,
    }
}

fn evm_entry(key: &str, endpoint: &str) -> NetworkEntry {
    NetworkEntry {
        is_ethereum: true,
        ..entry(key, endpoint)
    }
}

pub(crate) fn default_networks() -> Vec<NetworkEntry> {
    vec![
        entry("polkadot", "wss://rpc.polkadot.io"),
        entry("kusama", "wss://kusama-rpc.polkadot.io"),
        entry("westend", "wss://westend-rpc.polkadot.io"),
        entry("acala", "wss://acala-rpc-0.aca-api.network"),
        entry("karura", "wss://karura-rpc-0.aca-api.network"),
        entry("astar", "wss://rpc.astar.network"),
        entry("shiden", "wss://rpc.shiden.astar.network"),
        entry("turing", "wss://rpc.turing.oak.tech"),
        entry("kintsugi", "wss://api-kusama.interlay.io/parachain"),
        evm_entry("moonbeam", "https://rpc.api.moonbeam.network"),
        evm_entry("moonriver", "https://rpc.api.moonriver.moonbeam.network"),
    ]
}

/// Reads the network list from `MESH_NETWORKS_FILE` (a JSON array of
/// entries) when set, the built-in list otherwise.
pub(crate) fn load_networks() -> anyhow::Result<Vec<NetworkEntry>> {
    match std::env::var("MESH_NETWORKS_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            info!("loading network list from {}", path);
            let raw = fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        _ => Ok(default_networks()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_marks_evm_networks() {
        let networks = default_networks();

        let moonbeam = networks.iter().find(|n| n.key == "moonbeam").unwrap();
        assert!(moonbeam.is_ethereum);
        assert!(moonbeam.endpoint.starts_with("https://"));

        let polkadot = networks.iter().find(|n| n.key == "polkadot").unwrap();
        assert!(!polkadot.is_ethereum);
        assert!(polkadot.endpoint.starts_with("wss://"));
    }

    #[test]
    fn network_entries_parse_without_the_evm_flag() {
        let parsed: Vec<NetworkEntry> =
            serde_json::from_str(r#"[{"key": "aleph", "endpoint": "wss://ws.azero.dev"}]"#).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!parsed[0].is_ethereum);
    }
}

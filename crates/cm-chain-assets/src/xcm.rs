use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Weight budgeted for the standard four-instruction transfer program.
pub const FOUR_INSTRUCTIONS_WEIGHT: u64 = 4_000_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    Relay,
    Parachain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainDestination {
    pub role: ChainRole,
    pub supported_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainRelation {
    pub role: ChainRole,
    pub destinations: HashMap<String, CrossChainDestination>,
}

fn relation(role: ChainRole, destinations: &[(&str, ChainRole, &[&str])]) -> CrossChainRelation {
    CrossChainRelation {
        role,
        destinations: destinations
            .iter()
            .map(|(chain, role, tokens)| {
                (
                    (*chain).to_owned(),
                    CrossChainDestination {
                        role: *role,
                        supported_tokens: tokens.iter().map(|token| (*token).to_owned()).collect(),
                    },
                )
            })
            .collect(),
    }
}

/// Origin chain → destination chain → transferable tokens.
pub fn supported_cross_chains() -> &'static HashMap<String, CrossChainRelation> {
    static MAP: OnceLock<HashMap<String, CrossChainRelation>> = OnceLock::new();

    MAP.get_or_init(|| {
        use ChainRole::{Parachain, Relay};

        let mut map = HashMap::new();
        map.insert(
            "moonbase".to_owned(),
            relation(Parachain, &[("acala_dev", Parachain, &["xcKAR"])]),
        );
        map.insert(
            "acala".to_owned(),
            relation(
                Parachain,
                &[("moonbeam", Parachain, &["ACA", "AUSD", "LDOT"])],
            ),
        );
        map.insert(
            "moonbeam".to_owned(),
            relation(
                Parachain,
                &[
                    ("acala", Parachain, &["xcACA", "xcaUSD"]),
                    ("polkadot", Relay, &["xcDOT"]),
                ],
            ),
        );
        map.insert(
            "moonriver".to_owned(),
            relation(
                Parachain,
                &[
                    ("kusama", Relay, &["xcKSM"]),
                    ("bifrost", Parachain, &["xcBNC"]),
                ],
            ),
        );
        map.insert(
            "polkadot".to_owned(),
            relation(
                Relay,
                &[
                    ("astar", Parachain, &["DOT"]),
                    ("moonbeam", Parachain, &["DOT"]),
                ],
            ),
        );
        map.insert(
            "kusama".to_owned(),
            relation(Relay, &[("moonriver", Parachain, &["KSM"])]),
        );
        map.insert(
            "astar".to_owned(),
            relation(Parachain, &[("polkadot", Relay, &["DOT"])]),
        );
        map.insert(
            "karura".to_owned(),
            relation(
                Parachain,
                &[(
                    "moonriver",
                    Parachain,
                    &["KAR", "AUSD", "LKSM", "PHA", "KINT", "VSKSM", "KSM", "KBTC"],
                )],
            ),
        );
        map.insert(
            "kintsugi".to_owned(),
            relation(Parachain, &[("moonriver", Parachain, &["KINT"])]),
        );
        map.insert(
            "bifrost".to_owned(),
            relation(Parachain, &[("moonriver", Parachain, &["BNC"])]),
        );
        map
    })
}

pub fn is_transfer_supported(origin: &str, destination: &str, token: &str) -> bool {
    supported_cross_chains()
        .get(origin)
        .and_then(|relation| relation.destinations.get(destination))
        .is_some_and(|destination| {
            destination
                .supported_tokens
                .iter()
                .any(|supported| supported == token)
        })
}

/// Builds the destination descriptor for a parachain-to-parachain transfer.
// TODO: relay-chain source and destination descriptors are not covered yet
pub fn cross_chain_transfer_dest(para_id: u32, to_address: &str) -> Value {
    json!({
        "V1": {
            "parents": 1,
            "interior": {
                "X2": [
                    { "Parachain": para_id },
                    {
                        "AccountKey20": {
                            "network": "Any",
                            "key": to_address,
                        }
                    }
                ]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_corridors_are_supported() {
        assert!(is_transfer_supported("karura", "moonriver", "KBTC"));
        assert!(is_transfer_supported("moonbeam", "polkadot", "xcDOT"));
        assert!(is_transfer_supported("kusama", "moonriver", "KSM"));
    }

    #[test]
    fn unknown_corridors_and_tokens_are_rejected()  {
        assert!(!is_transfer_supported("karura", "moonriver", "DOT"));
        assert!(!is_transfer_supported("acala", "kusama", "ACA"));
        assert!(!is_transfer_supported("bitcoin", "moonriver", "BTC"));
    }

    #[test]
    fn relay_chains_are_tagged_as_such() {
        let map = supported_cross_chains();
        assert_eq!(map["polkadot"].role, ChainRole::Relay);
        assert_eq!(map["kusama"].role, ChainRole::Relay);
        assert_eq!(map["astar"].role, ChainRole::Parachain);
    }

    #[test]
    fn transfer_dest_encodes_parachain_and_account() {
        let dest = cross_chain_transfer_dest(2023, "0x5c3249acff2ce14c6b4c1b9297a6c1cd4c9c8b13");
        assert_eq!(dest.pointer("/V1/parents"), Some(&json!(1)));
        assert_eq!(dest.pointer("/V1/interior/X2/0/Parachain"), Some(&json!(2023)));
        assert_eq!(
            dest.pointer("/V1/interior/X2/1/AccountKey20/network"),
            Some(&json!("Any"))
        );
    }
}

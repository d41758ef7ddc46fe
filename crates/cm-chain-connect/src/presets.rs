use cm_api_types::NetworkKey;

/// Networks that need the Acala protocol extension set.
pub const ACALA_LIKE_NETWORKS: [&str; 4] = ["acala", "karura", "origintrail", "kintsugi"];

/// Networks that need the OAK protocol extension set.
pub const OAK_LIKE_NETWORKS: [&str; 2] = ["turingStaging", "turing"];

/// Which third-party protocol extension set a connection loads. Resolved
/// once at construction from the network key, not re-checked at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePreset {
    Standard,
    AcalaLike,
    OakLike,
}

impl TypePreset {
    pub fn for_network(key: &NetworkKey) -> Self {
        if ACALA_LIKE_NETWORKS.contains(&key.0.as_str()) {
            TypePreset::AcalaLike
        } else if OAK_LIKE_NETWORKS.contains(&key.0.as_str()) {
            TypePreset::OakLike
        } else {
            TypePreset::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypePreset::Standard => "standard",
            TypePreset::AcalaLike => "acala",
            TypePreset::OakLike => "oak",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_from_network_key() {
        assert_eq!(
            TypePreset::for_network(&NetworkKey("karura".to_owned())),
            TypePreset::AcalaLike
        );
        assert_eq!(
            TypePreset::for_network(&NetworkKey("turingStaging".to_owned())),
            TypePreset::OakLike
        );
        assert_eq!(
            TypePreset::for_network(&NetworkKey("polkadot".to_owned())),
            TypePreset::Standard
        );
    }
}

use serde_json::{Value, json};
use tracing::debug;

use crate::transport::ChainTransport;
use cm_api_types::ChainMetadata;

pub const DEFAULT_SS58_PREFIX: u16 = 42;
pub const DEFAULT_TOKEN_DECIMALS: u32 = 12;
pub const DEFAULT_TOKEN_SYMBOL: &str = "UNIT";
pub const DEFAULT_CHAIN_TYPE: &str = "Live";
pub const UNKNOWN_CHAIN: &str = "<unknown>";

/// Fetches the chain-descriptive fields once a transport signals ready.
///
/// Every query is individually tolerant: a transport that does not support
/// one of them (light client, parachain RPC gaps, the HTTP placeholder)
/// contributes the documented default instead of failing the load.
pub struct MetadataLoader;

impl MetadataLoader {
    pub async fn load(transport: &dyn ChainTransport) -> ChainMetadata {
        let system_chain = query_string(transport, "system_chain", UNKNOWN_CHAIN).await;
        let system_chain_type = query_string(transport, "system_chainType", DEFAULT_CHAIN_TYPE).await;
        let system_name = query_string(transport, "system_name", "").await;
        let system_version = query_string(transport, "system_version", "").await;

        let (spec_name, spec_version) = runtime_version(transport).await;
        let (ss58_format, token_decimals, token_symbol) = chain_properties(transport).await;

        ChainMetadata {
            spec_name,
            spec_version,
            system_chain,
            system_chain_type,
            system_name,
            system_version,
            token_symbol,
            token_decimals,
            ss58_format,
        }
    }
}

async fn query_string(transport: &dyn ChainTransport, method: &str, default: &str) -> String {
    match transport.request(method, json!([])).await {
        Ok(Value::String(value)) => value,
        Ok(other) if !other.is_null() => other.to_string(),
        Ok(_) => default.to_owned(),
        Err(err) => {
            debug!("{} unsupported on {}: {}", method, transport.endpoint(), err);
            default.to_owned()
        }
    }
}

async fn runtime_version(transport: &dyn ChainTransport) -> (String, String) {
    match transport.request("state_getRuntimeVersion", json!([])).await {
        Ok(value) => {
            let spec_name = value
                .get("specName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let spec_version = match value.get("specVersion") {
                Some(Value::Number(version)) => version.to_string(),
                Some(Value::String(version)) => version.clone(),
                _ => String::new(),
            };

            (spec_name, spec_version)
        }
        Err(err) => {
            debug!(
                "state_getRuntimeVersion unsupported on {}: {}",
                transport.endpoint(),
                err
            );
            (String::new(), String::new())
        }
    }
}

async fn chain_properties(transport: &dyn ChainTransport) -> (u16, Vec<u32>, Vec<String>) {
    let properties = match transport.request("system_properties", json!([])).await {
        Ok(value) => value,
        Err(err) => {
            debug!(
                "system_properties unsupported on {}: {}",
                transport.endpoint(),
                err
            );
            Value::Null
        }
    };

    let ss58_format = properties
        .get("ss58Format")
        .and_then(Value::as_u64)
        .map(|prefix| prefix as u16)
        .unwrap_or(DEFAULT_SS58_PREFIX);

    let token_decimals = match properties.get("tokenDecimals") {
        Some(Value::Number(decimals)) => decimals
            .as_u64()
            .map(|value| vec![value as u32])
            .unwrap_or_else(|| vec![DEFAULT_TOKEN_DECIMALS]),
        Some(Value::Array(decimals)) if !decimals.is_empty() => decimals
            .iter()
            .filter_map(Value::as_u64)
            .map(|value| value as u32)
            .collect(),
        _ => vec![DEFAULT_TOKEN_DECIMALS],
    };

    let token_symbol = match properties.get("tokenSymbol") {
        Some(Value::String(symbol)) => vec![symbol.clone()],
        Some(Value::Array(symbols)) if !symbols.is_empty() => symbols
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect(),
        _ => vec![DEFAULT_TOKEN_SYMBOL.to_owned()],
    };

    (ss58_format, token_decimals, token_symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn full_responses_populate_every_field() {
        let transport = MockTransport::socket("wss://rpc.test");
        transport.set_response("system_chain", json!("Kusama"));
        transport.set_response("system_chainType", json!("Live"));
        transport.set_response("system_name", json!("Parity Polkadot"));
        transport.set_response("system_version", json!("0.9.42"));
        transport.set_response(
            "state_getRuntimeVersion",
            json!({"specName": "kusama", "specVersion": 9420}),
        );
        transport.set_response(
            "system_properties",
            json!({"ss58Format": 2, "tokenDecimals": [12], "tokenSymbol": ["KSM"]}),
        );

        let metadata = MetadataLoader::load(&transport).await;

        assert_eq!(metadata.system_chain, "Kusama");
        assert_eq!(metadata.spec_name, "kusama");
        assert_eq!(metadata.spec_version, "9420");
        assert_eq!(metadata.ss58_format, 2);
        assert_eq!(metadata.token_decimals, vec![12]);
        assert_eq!(metadata.token_symbol, vec!["KSM".to_owned()]);
    }

    #[tokio::test]
    async fn missing_properties_fall_back_to_defaults() {
        let transport = MockTransport::socket("wss://rpc.test");
        transport.set_response("system_chain", json!("Sparse Chain"));
        // no system_properties, no runtime version: everything defaults

        let metadata = MetadataLoader::load(&transport).await;

        assert_eq!(metadata.system_chain, "Sparse Chain");
        assert_eq!(metadata.system_chain_type, DEFAULT_CHAIN_TYPE);
        assert_eq!(metadata.ss58_format, DEFAULT_SS58_PREFIX);
        assert_eq!(metadata.token_decimals, vec![DEFAULT_TOKEN_DECIMALS]);
        assert_eq!(metadata.token_symbol, vec![DEFAULT_TOKEN_SYMBOL.to_owned()]);
        assert_eq!(metadata.spec_name, "");
        assert_eq!(metadata.spec_version, "");
    }

    #[tokio::test]
    async fn scalar_property_shapes_are_accepted() {
        let transport = MockTransport::socket("wss://rpc.test");
        transport.set_response(
            "system_properties",
            json!({"ss58Format": 0, "tokenDecimals": 10, "tokenSymbol": "DOT"}),
        );

        let metadata = MetadataLoader::load(&transport).await;

        assert_eq!(metadata.ss58_format, 0);
        assert_eq!(metadata.token_decimals, vec![10]);
        assert_eq!(metadata.token_symbol, vec!["DOT".to_owned()]);
        assert_eq!(metadata.system_chain, UNKNOWN_CHAIN);
    }
}

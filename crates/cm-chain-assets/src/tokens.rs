use serde_json::{Value, json};
use tracing::warn;

use cm_chain_connect::{ChainTransport, TransportError};

/// Chains whose contract runtime takes weight-v2 gas limits.
pub const CHAINS_WITH_WEIGHT_V2: [&str; 3] = ["shiden", "astar", "shibuya"];

const WEIGHT_V2_REF_TIME: u64 = 32_490_000_000;
const WEIGHT_V2_PROOF_SIZE: u64 = 3_407_872;

/// Gas limit attached to read-only contract queries: a weight-v2 record on
/// the chains that require it, the unlimited sentinel everywhere else.
pub fn contract_call_gas_limit(chain: &str) -> Value {
    if CHAINS_WITH_WEIGHT_V2.contains(&chain) {
        json!({ "refTime": WEIGHT_V2_REF_TIME, "proofSize": WEIGHT_V2_PROOF_SIZE })
    } else {
        json!(-1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
    Psp22,
    Psp34,
}

/// Outcome of probing a token contract. Query failures never surface as an
/// error: they set `contract_error` with sentinel fields so the caller can
/// reject the contract address without special-casing transport faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContractInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: i64,
    pub contract_error: bool,
}

impl TokenContractInfo {
    fn invalid() -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            decimals: -1,
            contract_error: true,
        }
    }
}

pub async fn validate_token_contract(
    transport: &dyn ChainTransport,
    chain: &str,
    contract_address: &str,
    standard: TokenStandard,
    contract_caller: Option<&str>,
) -> TokenContractInfo {
    let caller = contract_caller.unwrap_or(contract_address);

    match standard {
        TokenStandard::Psp22 => {
            let name = contract_read(
                transport,
                contract_address,
                caller,
                "psp22Metadata::tokenName",
                json!(-1),
            )
            .await;
            let symbol = contract_read(
                transport,
                contract_address,
                caller,
                "psp22Metadata::tokenSymbol",
                json!(-1),
            )
            .await;
            let decimals = contract_read(
                transport,
                contract_address,
                caller,
                "psp22Metadata::tokenDecimals",
                json!(-1),
            )
            .await;

            let (Ok(name), Ok(symbol), Ok(decimals)) = (name, symbol, decimals) else {
                warn!(
                    "error response while validating token contract {} on {}",
                    contract_address, chain
                );
                return TokenContractInfo::invalid();
            };

            let name = output_string(&name);
            let symbol = output_string(&symbol);
            let decimals = output_decimals(&decimals);
            let contract_error = name.is_empty() || symbol.is_empty();

            TokenContractInfo {
                name,
                symbol,
                decimals,
                contract_error,
            }
        }

        TokenStandard::Psp34 => {
            let collection_id = contract_read(
                transport,
                contract_address,
                caller,
                "psp34::collectionId",
                contract_call_gas_limit(chain),
            )
            .await;

            let Ok(collection_id) = collection_id else {
                warn!(
                    "error response while validating collection contract {} on {}",
                    contract_address, chain
                );
                return TokenContractInfo::invalid();
            };

            let bytes = collection_id
                .get("Bytes")
                .and_then(Value::as_str)
                .unwrap_or_default();

            // no query yields a collection name; the owner names it manually
            TokenContractInfo {
                name: String::new(),
                symbol: String::new(),
                decimals: -1,
                contract_error: bytes.is_empty(),
            }
        }
    }
}

async fn contract_read(
    transport: &dyn ChainTransport,
    contract_address: &str,
    caller: &str,
    message: &str,
    gas_limit: Value,
) -> Result<Value, TransportError> {
    let reply = transport
        .request(
            "contracts_call",
            json!({
                "address": contract_address,
                "caller": caller,
                "message": message,
                "gasLimit": gas_limit,
            }),
        )
        .await?;

    let ok = reply
        .pointer("/result/ok")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let output = reply.get("output").cloned().filter(|value| !value.is_null());

    match output {
        Some(output) if ok => Ok(output),
        _ => Err(TransportError::Rpc(format!(
            "contract query {message} returned no usable output"
        ))),
    }
}

fn output_string(output: &Value) -> String {
    output.as_str().unwrap_or_default().to_owned()
}

fn output_decimals(output: &Value) -> i64 {
    match output {
        Value::Number(decimals) => decimals.as_i64().unwrap_or(-1),
        Value::String(decimals) => decimals.parse().unwrap_or(-1),
        _ => -1,
    }
}

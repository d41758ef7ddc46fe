//! Chain-asset helpers layered on a live connection: token-contract
//! validation and cross-chain transfer support tables.

pub mod tokens;
pub mod xcm;

pub use tokens::{
    CHAINS_WITH_WEIGHT_V2, TokenContractInfo, TokenStandard, contract_call_gas_limit,
    validate_token_contract,
};
pub use xcm::{
    ChainRole, CrossChainDestination, CrossChainRelation, FOUR_INSTRUCTIONS_WEIGHT,
    cross_chain_transfer_dest, is_transfer_supported, supported_cross_chains,
};

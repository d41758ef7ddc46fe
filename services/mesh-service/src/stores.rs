use axum::{
    Json,
    extract::{Path, Query, State},
};
use cm_api_types::{AssetRecord, NftCollectionRecord, StakingRewardRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiResult, AppState, bad_request, internal_error, not_found};

#[derive(Debug, Deserialize)]
pub(crate) struct RemoveAssetsQuery {
    slugs: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NftCollectionQuery {
    chains: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StoreAck {
    stored: bool,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub(crate) async fn list_assets(State(state): State<Arc<AppState>>) -> ApiResult<Vec<AssetRecord>> {
    let assets = state.store.get_all_assets().await.map_err(internal_error)?;
    Ok(Json(assets))
}

pub(crate) async fn upsert_asset(
    State(state): State<Arc<AppState>>,
    Json(record): Json<AssetRecord>,
) -> ApiResult<StoreAck> {
    if record.slug.trim().is_empty() {
        return Err(bad_request("asset slug is required"));
    }
    if record.chain.trim().is_empty() {
        return Err(bad_request("asset chain is required"));
    }

    state.store.upsert_asset(record).await.map_err(internal_error)?;
    Ok(Json(StoreAck { stored: true }))
}

pub(crate) async fn remove_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RemoveAssetsQuery>,
) -> ApiResult<StoreAck> {
    let slugs = split_list(&query.slugs);
    if slugs.is_empty() {
        return Err(bad_request("at least one slug is required"));
    }

    state.store.remove_assets(&slugs).await.map_err(internal_error)?;
    Ok(Json(StoreAck { stored: true }))
}

pub(crate) async fn list_nft_collections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NftCollectionQuery>,
) -> ApiResult<Vec<NftCollectionRecord>> {
    let chains = query.chains.as_deref().map(split_list);

    let collections = state
        .store
        .get_nft_collections(chains.as_deref())
        .await
        .map_err(internal_error)?;

    Ok(Json(collections))
}

pub(crate) async fn upsert_nft_collection(
    State(state): State<Arc<AppState>>,
    Json(record): Json<NftCollectionRecord>,
) -> ApiResult<StoreAck> {
    if record.chain.trim().is_empty() || record.collection_id.trim().is_empty() {
        return Err(bad_request("chain and collection_id are required"));
    }

    state
        .store
        .upsert_nft_collection(record)
        .await
        .map_err(internal_error)?;
    Ok(Json(StoreAck { stored: true }))
}

pub(crate) async fn get_staking_reward(
    State(state): State<Arc<AppState>>,
    Path((chain, address)): Path<(String, String)>,
) -> ApiResult<StakingRewardRecord> {
    let record = state
        .store
        .get_staking_reward(&chain, &address)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("no staking reward recorded for this account"))?;

    Ok(Json(record))
}

pub(crate) async fn upsert_staking_reward(
    State(state): State<Arc<AppState>>,
    Json(record): Json<StakingRewardRecord>,
) -> ApiResult<StoreAck> {
    if record.chain.trim().is_empty() || record.address.trim().is_empty() {
        return Err(bad_request("chain and address are required"));
    }

    state
        .store
        .upsert_staking_reward(record)
        .await
        .map_err(internal_error)?;
    Ok(Json(StoreAck { stored: true }))
}

use axum::{
    Json,
    extract::{Path, State},
};
use cm_api_types::{ConnectionSnapshot, NetworkKey, NetworkInfo};
use cm_chain_connect::TransportError;
use std::sync::Arc;
use tracing::info;

use crate::{ApiResult, AppState, bad_request, internal_error, not_found};

pub(crate) async fn list_networks(State(state): State<Arc<AppState>>) -> Json<Vec<NetworkInfo>> {
    let networks = state
        .networks
        .iter()
        .map(|entry| NetworkInfo {
            key: NetworkKey(entry.key.clone()),
            endpoint: entry.endpoint.clone(),
            is_ethereum: entry.is_ethereum,
        })
        .collect();

    Json(networks)
}

pub(crate) async fn list_chains(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionSnapshot>> {
    Json(state.registry.snapshots().await)
}

pub(crate) async fn get_chain(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<ConnectionSnapshot> {
    let handle = state
        .registry
        .get(&NetworkKey(key))
        .await
        .ok_or_else(|| not_found("no connection for this network key"))?;

    Ok(Json(handle.snapshot()))
}

pub(crate) async fn recover_chain(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<ConnectionSnapshot> {
    let handle = state
        .registry
        .get(&NetworkKey(key.clone()))
        .await
        .ok_or_else(|| not_found("no connection for this network key"))?;

    info!("recover requested for {}", key);

    match handle.recover_connect().await {
        Ok(()) => Ok(Json(handle.snapshot())),
        Err(TransportError::RetryExhausted) => Err(bad_request(
            "connection is terminated; it is recreated on the next get_or_create",
        )),
        Err(err) => Err(internal_error(err)),
    }
}

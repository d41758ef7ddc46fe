use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post, put},
};
use cm_api_types::NetworkKey;
use cm_chain_connect::{ConnectOptions, ConnectionRegistry, ReconnectPolicy};
use cm_storage::{InMemoryStore, RocksDbStore, WalletStore};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

mod chains;
mod networks;
mod stores;

use networks::NetworkEntry;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub(crate) struct AppState {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) store: Arc<dyn WalletStore>,
    pub(crate) networks: Vec<NetworkEntry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = open_store();
    let networks = networks::load_networks()?;
    let registry = ConnectionRegistry::new(ReconnectPolicy::default());

    let state = Arc::new(AppState {
        registry,
        store,
        networks,
    });

    connect_configured_networks(&state).await;

    let app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/networks", get(chains::list_networks))
        .route("/chains", get(chains::list_chains))
        .route("/chains/{key}", get(chains::get_chain))
        .route("/chains/{key}/recover", post(chains::recover_chain))
        .route(
            "/assets",
            get(stores::list_assets)
                .put(stores::upsert_asset)
                .delete(stores::remove_assets),
        )
        .route(
            "/nft-collections",
            get(stores::list_nft_collections).put(stores::upsert_nft_collection),
        )
        .route(
            "/staking-rewards/{chain}/{address}",
            get(stores::get_staking_reward),
        )
        .route("/staking-rewards", put(stores::upsert_staking_reward))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    info!("mesh-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down, removing all chain connections");
    state.registry.remove_all().await;

    Ok(())
}

fn open_store() -> Arc<dyn WalletStore> {
    match std::env::var("MESH_DATA_DIR") {
        Ok(path) if !path.trim().is_empty() => match RocksDbStore::open_default(&path) {
            Ok(store) => {
                info!("using RocksDB store at {}", path);
                Arc::new(store)
            }
            Err(err) => {
                warn!(
                    "failed to open RocksDB store at {}: {}. Falling back to in-memory store",
                    path, err
                );
                Arc::new(InMemoryStore::default())
            }
        },
        _ => {
            info!("MESH_DATA_DIR not set, using in-memory store");
            Arc::new(InMemoryStore::default())
        }
    }
}

/// Kicks off a connection for every configured network. Establishment is
/// asynchronous: failures here are endpoint-construction problems, not
/// connectivity ones, and must not stop the service.
async fn connect_configured_networks(state: &Arc<AppState>) {
    for entry in &state.networks {
        let options = ConnectOptions {
            is_ethereum: entry.is_ethereum,
            ..ConnectOptions::default()
        };

        match state
            .registry
            .get_or_create(NetworkKey(entry.key.clone()), &entry.endpoint, options)
            .await
        {
            Ok(_) => info!("connection started for {}", entry.key),
            Err(err) => warn!("skipping {}: {}", entry.key, err),
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "mesh-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "mesh-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

pub(crate) fn not_found(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

pub(crate) fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

//! Seed directory HTTP surface
//!
//! `POST /` registers a node and hands back a peer, `GET /sendonly` picks a
//! random node for a wallet, `GET /health` reports the registry size. CORS is
//! permissive on the first two routes only.

use super::registry::{Assignment, PeerRegistry};
use crate::{Error, NodeDescriptor, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SeedState {
    pub registry: Arc<PeerRegistry>,
}

impl SeedState {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStatus {
    FirstNode,
    PeerAssigned,
    NodeSelected,
    NoNodes,
}

/// Body of `/` and `/sendonly` responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    pub message: String,
    pub status: SeedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedHealth {
    pub status: String,
    pub node_count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    let error = message.into();
    warn!("Rejected registration: {}", error);
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
}

async fn register(State(state): State<SeedState>, body: Bytes) -> Response {
    if body.is_empty() {
        return bad_request("empty request body");
    }

    let descriptor: NodeDescriptor = match serde_json::from_slice(&body) {
        Ok(descriptor) => descriptor,
        Err(e) => return bad_request(format!("invalid node descriptor: {}", e)),
    };
    if let Err(e) = descriptor.validate() {
        return bad_request(e.to_string());
    }

    let key = descriptor.key();
    let response = match state.registry.register(descriptor) {
        Assignment::FirstNode => {
            info!(node = %key, "Registered first node");
            SeedResponse {
                message: String::new(),
                status: SeedStatus::FirstNode,
            }
        }
        Assignment::PeerAssigned(peer) => {
            info!(node = %key, peer = %peer, "Registered node");
            SeedResponse {
                message: peer,
                status: SeedStatus::PeerAssigned,
            }
        }
    };

    Json(response).into_response()
}

async fn send_only(State(state): State<SeedState>) -> Response {
    match state.registry.random() {
        Some(node) => {
            debug!(node = %node.key(), "Selected node for wallet");
            Json(SeedResponse {
                message: node.peer_address(),
                status: SeedStatus::NodeSelected,
            })
            .into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SeedResponse {
                message: String::new(),
                status: SeedStatus::NoNodes,
            }),
        )
            .into_response(),
    }
}

async fn health(State(state): State<SeedState>) -> impl IntoResponse {
    Json(SeedHealth {
        status: "healthy".to_string(),
        node_count: state.registry.len(),
    })
}

pub fn router(state: SeedState) -> Router {
    let public = Router::new()
        .route("/", post(register))
        .route("/sendonly", get(send_only))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health))
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the seed API on `listener` until `shutdown` fires
pub async fn serve(listener: TcpListener, state: SeedState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Seed directory listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::network(format!("Seed HTTP server failed: {}", e)))
}

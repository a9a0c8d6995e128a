//! Node runtime
//!
//! Binds the peer wire listener and the HTTP health listener, registers with
//! the seed directory, dials the assigned and static peers, and keeps the
//! mempool pruned until shutdown.

use crate::client::SeedClient;
use crate::config::{NodeConfig, NodeRole};
use crate::gossip::{GossipConfig, GossipNode};
use crate::peer::{MessageHandler, PeerManager, PeerManagerConfig};
use crate::seed::Assignment;
use crate::utils::{format_hash_rate, RetryPolicy};
use crate::worker::CpuWorker;
use crate::{Error, NodeDescriptor, Result};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Body of the node's `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub status: String,
    pub role: NodeRole,
    pub peers: usize,
    pub pending: usize,
    pub finalized: usize,
}

impl NodeHealth {
    fn of(gossip: &GossipNode) -> Self {
        let counts = gossip.mempool_counts();
        Self {
            status: "healthy".to_string(),
            role: gossip.role(),
            peers: gossip.peers().len(),
            pending: counts.pending,
            finalized: counts.finalized,
        }
    }
}

async fn health(State(gossip): State<GossipNode>) -> Json<NodeHealth> {
    Json(NodeHealth::of(&gossip))
}

pub fn health_router(gossip: GossipNode) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(gossip)
}

/// A node with its listeners bound, ready to run
pub struct NodeRuntime {
    config: NodeConfig,
    gossip: GossipNode,
    p2p_listener: TcpListener,
    http_listener: TcpListener,
    descriptor: NodeDescriptor,
}

impl NodeRuntime {
    /// Bind both listeners and build the peer and gossip layers.
    ///
    /// Bind failures are returned as errors; the caller treats them as fatal.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let p2p_addr = config.p2p_socket_addr()?;
        let http_addr = config.http_socket_addr()?;

        let p2p_listener = TcpListener::bind(p2p_addr)
            .await
            .map_err(|e| Error::network(format!("Failed to bind peer listener on {}: {}", p2p_addr, e)))?;
        let http_listener = TcpListener::bind(http_addr)
            .await
            .map_err(|e| Error::network(format!("Failed to bind HTTP listener on {}: {}", http_addr, e)))?;

        // Advertise the ports actually bound, which differ from the config for port 0
        let mut descriptor = config.descriptor();
        descriptor.http_port = http_listener.local_addr()?.port();
        descriptor.p2p_port = Some(p2p_listener.local_addr()?.port());

        let mut peer_config = PeerManagerConfig::new(config.identity());
        peer_config.connect_timeout = config.connect_timeout();
        peer_config.write_timeout = config.write_timeout();
        peer_config.max_peers = config.max_peers;
        let peers = Arc::new(PeerManager::new(peer_config));

        let worker = Arc::new(CpuWorker::new(config.max_concurrent_searches));
        let gossip = GossipNode::new(
            GossipConfig {
                role: config.role,
                difficulty: config.difficulty()?,
                seen_capacity: config.seen_capacity,
                pending_ttl: config.pending_ttl(),
            },
            peers,
            worker,
        );

        Ok(Self {
            config,
            gossip,
            p2p_listener,
            http_listener,
            descriptor,
        })
    }

    pub fn gossip(&self) -> &GossipNode {
        &self.gossip
    }

    /// Descriptor announced to the seed, with the ports actually bound
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn p2p_addr(&self) -> Result<SocketAddr> {
        Ok(self.p2p_listener.local_addr()?)
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http_listener.local_addr()?)
    }

    /// Serve until `shutdown` fires, then cancel searches and close every peer
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let NodeRuntime {
            config,
            gossip,
            p2p_listener,
            http_listener,
            descriptor,
        } = self;

        info!(
            "Node {} running as {} (peer wire {}, http {})",
            config.identity(),
            config.role,
            p2p_listener.local_addr()?,
            http_listener.local_addr()?
        );

        let handler: Arc<dyn MessageHandler> = Arc::new(gossip.clone());
        let peers = Arc::clone(gossip.peers());

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(Arc::clone(&peers).run_listener(
            p2p_listener,
            Arc::clone(&handler),
            shutdown.clone(),
        )));

        let http_shutdown = shutdown.clone();
        let app = health_router(gossip.clone());
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, app)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await
            {
                error!("Health endpoint failed: {}", e);
            }
        }));

        tasks.push(tokio::spawn(prune_loop(
            gossip.clone(),
            config.prune_interval(),
            shutdown.clone(),
        )));

        let bootstrap_shutdown = shutdown.clone();
        let bootstrap_handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = bootstrap(&config, &descriptor, &peers, bootstrap_handler) => {}
                _ = bootstrap_shutdown.cancelled() => {}
            }
        }));

        shutdown.cancelled().await;
        info!("Shutting down node");

        gossip.cancel_all();
        gossip.peers().close_all();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Node task ended abnormally: {}", e);
            }
        }

        info!("Node stopped");
        Ok(())
    }
}

/// Register with the seed (if configured) and dial the assigned and static peers
#[instrument(skip_all, fields(node = %descriptor.key()))]
async fn bootstrap(
    config: &NodeConfig,
    descriptor: &NodeDescriptor,
    peers: &Arc<PeerManager>,
    handler: Arc<dyn MessageHandler>,
) {
    let mut targets = config.peers.clone();

    match config.seed_url() {
        Ok(Some(url)) => match register(url, config, descriptor).await {
            Ok(Assignment::PeerAssigned(peer)) => targets.insert(0, peer),
            Ok(Assignment::FirstNode) => info!("First node in the network, waiting for inbound peers"),
            Err(e) => error!("Seed registration failed, continuing without it: {}", e),
        },
        Ok(None) => {}
        Err(e) => error!("Invalid seed URL: {}", e),
    }

    for target in targets {
        if let Err(e) = peers.connect(&target, Arc::clone(&handler)).await {
            warn!("Could not connect to peer {}: {}", target, e);
        }
    }
}

async fn register(url: url::Url, config: &NodeConfig, descriptor: &NodeDescriptor) -> Result<Assignment> {
    let retry = RetryPolicy::new(
        config.registration_attempts,
        Duration::from_millis(500),
        Duration::from_secs(5),
    );
    SeedClient::new(url, config.connect_timeout())?
        .with_retry_policy(retry)
        .register(descriptor)
        .await
}

async fn prune_loop(gossip: GossipNode, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                gossip.prune();
                let counts = gossip.mempool_counts();
                let mining = gossip.mining_stats();
                info!(
                    "Peers: {}, pending: {}, finalized: {}, hash rate: {}",
                    gossip.peers().len(),
                    counts.pending,
                    counts.finalized,
                    format_hash_rate(mining.average_hash_rate)
                );
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn local_config(role: NodeRole) -> NodeConfig {
        NodeConfig {
            listen_address: "127.0.0.1".into(),
            p2p_port: 0,
            http_port: 0,
            role,
            difficulty: 1,
            identity: Some(format!("test-{}", role)),
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_advertises_bound_ports() {
        let runtime = NodeRuntime::bind(local_config(NodeRole::Relay)).await.unwrap();
        let descriptor = runtime.descriptor().clone();

        assert_eq!(descriptor.http_port, runtime.http_addr().unwrap().port());
        assert_eq!(descriptor.p2p_port, Some(runtime.p2p_addr().unwrap().port()));
        assert_ne!(descriptor.http_port, 0);
        assert_eq!(descriptor.ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_fixed_ports_match_configured_descriptor() {
        let free = |listener: std::net::TcpListener| listener.local_addr().unwrap().port();
        let http_port = free(std::net::TcpListener::bind("127.0.0.1:0").unwrap());
        let p2p_port = free(std::net::TcpListener::bind("127.0.0.1:0").unwrap());

        let mut config = local_config(NodeRole::Relay);
        config.http_port = http_port;
        config.p2p_port = p2p_port;
        config.advertise_ip = "10.1.2.3".into();

        let runtime = NodeRuntime::bind(config.clone()).await.unwrap();
        assert_eq!(runtime.descriptor(), &config.descriptor());
    }

    #[tokio::test]
    async fn test_bind_failure_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = local_config(NodeRole::Miner);
        config.p2p_port = taken.local_addr().unwrap().port();

        assert!(NodeRuntime::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let runtime = NodeRuntime::bind(local_config(NodeRole::Miner)).await.unwrap();
        let app = health_router(runtime.gossip().clone());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: NodeHealth = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            health,
            NodeHealth {
                status: "healthy".into(),
                role: NodeRole::Miner,
                peers: 0,
                pending: 0,
                finalized: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let runtime = NodeRuntime::bind(local_config(NodeRole::Relay)).await.unwrap();
        let http_addr = runtime.http_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(shutdown.clone()));

        let url = format!("http://{}/health", http_addr);
        let health: NodeHealth = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(health.role, NodeRole::Relay);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("node stops promptly")
            .unwrap()
            .unwrap();
    }
}

//! Liveness sweep
//!
//! Probes run concurrently against a snapshot of the registry, each bounded by
//! a timeout; dead nodes are then removed in one batch. No registry lock is
//! held while probes are in flight.

use super::registry::PeerRegistry;
use crate::{Error, NodeDescriptor, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Checks whether a node is alive
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, node: &NodeDescriptor) -> Result<()>;
}

/// `GET http://{ip}:{http_port}/health`, success status required
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, node: &NodeDescriptor) -> Result<()> {
        let response = self.client.get(node.health_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!(
                "{} answered health check with {}",
                node.key(),
                status
            )));
        }
        Ok(())
    }
}

/// Result of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub removed: Vec<String>,
}

/// Sweep timing
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub interval: Duration,
    pub empty_poll: Duration,
    pub probe_timeout: Duration,
}

pub struct LivenessSweeper {
    registry: Arc<PeerRegistry>,
    probe: Arc<dyn LivenessProbe>,
    schedule: SweepSchedule,
}

impl LivenessSweeper {
    pub fn new(registry: Arc<PeerRegistry>, probe: Arc<dyn LivenessProbe>, schedule: SweepSchedule) -> Self {
        Self {
            registry,
            probe,
            schedule,
        }
    }

    /// Probe every tracked node once and drop the ones that failed
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> SweepReport {
        let nodes = self.registry.snapshot();
        if nodes.is_empty() {
            return SweepReport::default();
        }

        let probes = nodes.iter().map(|node| async move {
            let outcome = tokio::time::timeout(self.schedule.probe_timeout, self.probe.probe(node))
                .await
                .unwrap_or_else(|_| Err(Error::timeout(format!("liveness probe of {}", node.key()))));
            (node.key(), outcome)
        });

        let mut alive = Vec::new();
        let mut dead = Vec::new();
        for (key, outcome) in join_all(probes).await {
            match outcome {
                Ok(()) => alive.push(key),
                Err(e) => {
                    warn!(node = %key, "Liveness probe failed: {}", e);
                    dead.push(key);
                }
            }
        }

        self.registry.touch_many(&alive);
        let removed = self.registry.remove_many(&dead);
        if removed > 0 {
            info!("Removed {} unreachable nodes, {} remain", removed, self.registry.len());
        } else {
            debug!("All {} nodes alive", nodes.len());
        }

        SweepReport {
            probed: nodes.len(),
            removed: dead,
        }
    }

    /// Sweep on the configured interval until `shutdown` fires; an empty
    /// registry is re-checked after the shorter poll delay instead
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Liveness sweeper started (every {:?}, probe timeout {:?})",
            self.schedule.interval, self.schedule.probe_timeout
        );

        loop {
            let wait = if self.registry.is_empty() {
                self.schedule.empty_poll
            } else {
                self.sweep_once().await;
                self.schedule.interval
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    info!("Liveness sweeper stopped");
                    break;
                }
            }
        }
    }
}

//! Seed directory service
//!
//! On-boards nodes over HTTP, assigns each a peer and evicts nodes that stop
//! answering liveness probes.

pub mod registry;
pub mod server;
pub mod sweep;

pub use registry::{Assignment, PeerRegistry};
pub use server::{router, SeedHealth, SeedResponse, SeedState, SeedStatus};
pub use sweep::{HttpProbe, LivenessProbe, LivenessSweeper, SweepReport, SweepSchedule};

use crate::config::SeedConfig;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the seed directory until `shutdown` fires
pub async fn run_seed(config: SeedConfig, shutdown: CancellationToken) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::network(format!("Failed to bind seed listener on {}: {}", addr, e)))?;

    let registry = Arc::new(PeerRegistry::new());
    let probe = Arc::new(HttpProbe::new(config.probe_timeout())?);
    let sweeper = LivenessSweeper::new(
        Arc::clone(&registry),
        probe,
        SweepSchedule {
            interval: config.sweep_interval(),
            empty_poll: config.empty_poll_interval(),
            probe_timeout: config.probe_timeout(),
        },
    );
    let sweep_task = tokio::spawn(sweeper.run(shutdown.clone()));

    let result = server::serve(listener, SeedState::new(registry), shutdown.clone()).await;

    shutdown.cancel();
    let _ = sweep_task.await;
    info!("Seed directory stopped");
    result
}

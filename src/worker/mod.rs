//! Proof-of-work workers
//!
//! A worker takes a mining job (payload and difficulty for one transaction) and
//! searches for a winning nonce off the async runtime, honouring a cancellation
//! token so redundant searches can be stopped once a peer's result arrives.

use crate::{Difficulty, Result, Solution, Transaction, TxId};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub mod cpu;

pub use cpu::CpuWorker;

/// Work handed to a mining worker
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub tx_id: TxId,
    pub payload: String,
    pub difficulty: Difficulty,
}

impl MiningJob {
    /// Build the job for a transaction using its canonical mining payload
    pub fn for_transaction(tx: &Transaction, difficulty: Difficulty) -> Self {
        Self {
            tx_id: tx.id.clone(),
            payload: tx.mining_payload(),
            difficulty,
        }
    }
}

/// Mining statistics for a worker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningStats {
    /// Total digests computed
    pub total_hashes: u64,
    /// Number of solutions found
    pub solutions_found: u64,
    /// Searches stopped by cancellation
    pub searches_cancelled: u64,
    /// Searches currently running
    pub active_searches: u64,
    /// Time since the worker was created (seconds)
    pub mining_time_secs: u64,
    /// Average hash rate (hashes per second)
    pub average_hash_rate: f64,
}

/// Mining worker trait
#[async_trait]
pub trait MiningWorker: Send + Sync {
    /// Get the worker type name for logging
    fn worker_type(&self) -> &'static str;

    /// Search for a solution to `job`.
    ///
    /// Resolves with the winning digest and nonce, or with `Error::Cancelled`
    /// once `cancellation` fires.
    async fn mine(&self, job: MiningJob, cancellation: CancellationToken) -> Result<Solution>;

    /// Get current mining statistics
    fn stats(&self) -> MiningStats {
        MiningStats::default()
    }
}

/// Utility function to compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Create a tracing span for mining operations
pub fn mining_span(worker_type: &str, job: &MiningJob) -> Span {
    tracing::info_span!(
        "mining",
        worker_type = worker_type,
        tx_id = %job.tx_id,
        difficulty = job.difficulty.value(),
    )
}

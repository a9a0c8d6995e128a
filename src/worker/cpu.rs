//! CPU mining worker
//!
//! Each search runs on a blocking thread so peer read loops stay responsive.
//! A semaphore caps how many searches hash at once; excess jobs wait for a
//! permit (or for cancellation) before starting.

use super::{compute_hash_rate, mining_span, MiningJob, MiningStats, MiningWorker};
use crate::{crypto, Error, Result, Solution};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Semaphore};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// CPU mining worker
pub struct CpuWorker {
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    stats: Arc<CpuMiningStats>,
}

/// Thread-safe mining statistics for CPU worker
#[derive(Debug)]
struct CpuMiningStats {
    total_hashes: AtomicU64,
    solutions_found: AtomicU64,
    searches_cancelled: AtomicU64,
    active_searches: AtomicU64,
    start_time: Instant,
}

impl CpuMiningStats {
    fn new() -> Self {
        Self {
            total_hashes: AtomicU64::new(0),
            solutions_found: AtomicU64::new(0),
            searches_cancelled: AtomicU64::new(0),
            active_searches: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn to_mining_stats(&self) -> MiningStats {
        let total_hashes = self.total_hashes.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();

        MiningStats {
            total_hashes,
            solutions_found: self.solutions_found.load(Ordering::Relaxed),
            searches_cancelled: self.searches_cancelled.load(Ordering::Relaxed),
            active_searches: self.active_searches.load(Ordering::Relaxed),
            mining_time_secs: elapsed.as_secs(),
            average_hash_rate: compute_hash_rate(total_hashes, elapsed),
        }
    }
}

impl CpuWorker {
    /// Create a worker running at most `max_concurrent` searches (0 = one per CPU)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = if max_concurrent == 0 {
            num_cpus::get()
        } else {
            max_concurrent
        };

        info!("Creating CPU worker with {} concurrent searches", max_concurrent);

        Self {
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            stats: Arc::new(CpuMiningStats::new()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn run_search(&self, job: MiningJob, cancellation: CancellationToken) -> Result<Solution> {
        let permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                self.stats.searches_cancelled.fetch_add(1, Ordering::Relaxed);
                return Err(Error::cancelled(format!("mining {}", job.tx_id)));
            }
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| Error::worker("cpu", "Search pool closed"))?
            }
        };

        debug!("Search started");
        self.stats.active_searches.fetch_add(1, Ordering::Relaxed);

        // The blocking thread hands its outcome back through a one-shot channel
        let (solution_tx, solution_rx) = oneshot::channel();
        let stats = Arc::clone(&self.stats);
        let token = cancellation.clone();
        let payload = job.payload.clone();
        let difficulty = job.difficulty;

        let handle = task::spawn_blocking(move || {
            let _permit = permit;
            let started = Instant::now();
            let mut hashes = 0u64;
            let outcome = crypto::search_with(&payload, difficulty, |batch| {
                hashes += batch;
                stats.total_hashes.fetch_add(batch, Ordering::Relaxed);
                !token.is_cancelled()
            });
            debug!(
                "Search thread finished after {} hashes ({:.0} H/s)",
                hashes,
                compute_hash_rate(hashes, started.elapsed())
            );
            let _ = solution_tx.send(outcome);
        });

        let result = tokio::select! {
            outcome = solution_rx => match outcome {
                Ok(Some(solution)) => {
                    self.stats.solutions_found.fetch_add(1, Ordering::Relaxed);
                    info!("Solution found at nonce {}: {}", solution.nonce, solution.hash);
                    Ok(solution)
                }
                Ok(None) if cancellation.is_cancelled() => {
                    self.stats.searches_cancelled.fetch_add(1, Ordering::Relaxed);
                    Err(Error::cancelled(format!("mining {}", job.tx_id)))
                }
                Ok(None) => {
                    warn!("Nonce space exhausted without a solution");
                    Err(Error::worker("cpu", "Nonce space exhausted"))
                }
                Err(_) => Err(Error::worker("cpu", "Search thread exited without a result")),
            },
            _ = cancellation.cancelled() => {
                info!("Search cancelled");
                self.stats.searches_cancelled.fetch_add(1, Ordering::Relaxed);
                Err(Error::cancelled(format!("mining {}", job.tx_id)))
            }
        };

        // A cancelled search notices the token within one batch
        if let Err(e) = handle.await {
            warn!("Search thread panicked: {}", e);
        }
        self.stats.active_searches.fetch_sub(1, Ordering::Relaxed);

        result
    }
}

#[async_trait]
impl MiningWorker for CpuWorker {
    fn worker_type(&self) -> &'static str {
        "cpu"
    }

    async fn mine(&self, job: MiningJob, cancellation: CancellationToken) -> Result<Solution> {
        let span = mining_span(self.worker_type(), &job);
        self.run_search(job, cancellation).instrument(span).await
    }

    fn stats(&self) -> MiningStats {
        self.stats.to_mining_stats()
    }
}

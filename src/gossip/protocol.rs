//! Gossip and relay protocol
//!
//! New transactions are deduplicated through the seen-set, then either mined
//! (miner role) or flooded to every other peer (relay role). Mined results are
//! verified against the local copy of the transaction before the transaction
//! is finalized and the result flooded on. Nothing is ever sent back to the
//! peer it came from.

use super::mempool::{Mempool, MempoolCounts, TxState};
use super::seen::SeenSet;
use crate::config::NodeRole;
use crate::crypto;
use crate::peer::{MessageHandler, MessageType, PeerManager};
use crate::worker::{MiningJob, MiningStats, MiningWorker};
use crate::{Difficulty, Error, MinedResult, Result, Solution, Transaction, TxId};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Gossip settings
#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub role: NodeRole,
    pub difficulty: Difficulty,
    pub seen_capacity: usize,
    pub pending_ttl: Duration,
}

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub transactions_accepted: u64,
    pub duplicates_dropped: u64,
    pub transactions_relayed: u64,
    pub solutions_published: u64,
    pub results_accepted: u64,
    pub results_rejected: u64,
    pub searches_cancelled: u64,
    pub transactions_abandoned: u64,
}

#[derive(Default)]
struct Counters {
    transactions_accepted: AtomicU64,
    duplicates_dropped: AtomicU64,
    transactions_relayed: AtomicU64,
    solutions_published: AtomicU64,
    results_accepted: AtomicU64,
    results_rejected: AtomicU64,
    searches_cancelled: AtomicU64,
    transactions_abandoned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> GossipStats {
        GossipStats {
            transactions_accepted: self.transactions_accepted.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            transactions_relayed: self.transactions_relayed.load(Ordering::Relaxed),
            solutions_published: self.solutions_published.load(Ordering::Relaxed),
            results_accepted: self.results_accepted.load(Ordering::Relaxed),
            results_rejected: self.results_rejected.load(Ordering::Relaxed),
            searches_cancelled: self.searches_cancelled.load(Ordering::Relaxed),
            transactions_abandoned: self.transactions_abandoned.load(Ordering::Relaxed),
        }
    }
}

struct GossipInner {
    config: GossipConfig,
    peers: Arc<PeerManager>,
    worker: Arc<dyn MiningWorker>,
    seen: SeenSet<TxId>,
    finalized: SeenSet<TxId>,
    mempool: Mempool,
    active_mining: Mutex<HashMap<TxId, CancellationToken>>,
    /// Results that arrived before their transaction
    parked_results: Mutex<HashMap<TxId, ParkedResult>>,
    counters: Counters,
}

struct ParkedResult {
    announcer: String,
    result: MinedResult,
    parked_at: Instant,
}

/// Gossip protocol state for one node; cheap to clone
#[derive(Clone)]
pub struct GossipNode {
    inner: Arc<GossipInner>,
}

impl GossipNode {
    pub fn new(config: GossipConfig, peers: Arc<PeerManager>, worker: Arc<dyn MiningWorker>) -> Self {
        info!(
            "Gossip node ready as {} (difficulty {}, seen capacity {})",
            config.role, config.difficulty, config.seen_capacity
        );
        Self {
            inner: Arc::new(GossipInner {
                seen: SeenSet::new(config.seen_capacity),
                finalized: SeenSet::new(config.seen_capacity),
                mempool: Mempool::new(),
                active_mining: Mutex::new(HashMap::new()),
                parked_results: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                config,
                peers,
                worker,
            }),
        }
    }

    pub fn role(&self) -> NodeRole {
        self.inner.config.role
    }

    pub fn peers(&self) -> &Arc<PeerManager> {
        &self.inner.peers
    }

    pub fn stats(&self) -> GossipStats {
        self.inner.counters.snapshot()
    }

    pub fn mining_stats(&self) -> MiningStats {
        self.inner.worker.stats()
    }

    pub fn mempool_counts(&self) -> MempoolCounts {
        self.inner.mempool.counts()
    }

    pub fn transaction_state(&self, id: &TxId) -> Option<TxState> {
        self.inner.mempool.state(id)
    }

    pub fn is_mining(&self, id: &TxId) -> bool {
        self.inner.active_mining.lock().contains_key(id)
    }

    /// Results waiting for their transaction to arrive
    pub fn parked_results(&self) -> usize {
        self.inner.parked_results.lock().len()
    }

    /// Inject a transaction as if a peer had gossiped it (wallet submission path)
    pub async fn submit(&self, tx: Transaction) -> Result<bool> {
        let payload = Bytes::from(tx.to_json_bytes()?);
        self.accept_transaction(None, tx, payload).await
    }

    /// Abandon pending transactions older than the TTL and stop their searches.
    /// Parked results older than the TTL are dropped too.
    pub fn prune(&self) -> usize {
        let ttl = self.inner.config.pending_ttl;
        let expired = {
            let mut parked = self.inner.parked_results.lock();
            let before = parked.len();
            parked.retain(|_, entry| entry.parked_at.elapsed() < ttl);
            before - parked.len()
        };
        if expired > 0 {
            info!("Dropped {} parked results whose transaction never arrived", expired);
        }

        let abandoned = self.inner.mempool.prune(ttl);
        for id in &abandoned {
            if let Some(token) = self.inner.active_mining.lock().remove(id) {
                token.cancel();
            }
            self.inner.parked_results.lock().remove(id);
            Counters::bump(&self.inner.counters.transactions_abandoned);
            debug!(tx_id = %id, "Abandoned pending transaction");
        }
        if !abandoned.is_empty() {
            info!("Abandoned {} transactions without a mined result", abandoned.len());
        }
        abandoned.len()
    }

    /// Cancel every running search
    pub fn cancel_all(&self) {
        for (_, token) in self.inner.active_mining.lock().drain() {
            token.cancel();
        }
    }

    #[instrument(skip(self, payload), fields(len = payload.len()))]
    async fn on_gossip(&self, peer: &str, payload: Bytes) -> Result<()> {
        let tx = Transaction::from_json_bytes(&payload)?;
        self.accept_transaction(Some(peer), tx, payload).await?;
        Ok(())
    }

    /// Returns `true` if the transaction was new to this node
    async fn accept_transaction(&self, from: Option<&str>, tx: Transaction, payload: Bytes) -> Result<bool> {
        let inner = &self.inner;
        if !inner.seen.insert(tx.id.clone()) {
            debug!(tx_id = %tx.id, "Duplicate transaction dropped");
            Counters::bump(&inner.counters.duplicates_dropped);
            return Ok(false);
        }

        Counters::bump(&inner.counters.transactions_accepted);
        inner.mempool.insert(tx.clone());
        info!(tx_id = %tx.id, "Accepted transaction {} -> {} ({})", tx.sender, tx.recipient, tx.amount);

        let parked = inner.parked_results.lock().remove(&tx.id);
        let finalized = match parked {
            Some(entry) => self.try_finalize(&tx, entry.result, &entry.announcer).await,
            None => false,
        };

        match inner.config.role {
            NodeRole::Miner if finalized => {
                debug!(tx_id = %tx.id, "Already finalized by a parked result, not mining");
            }
            NodeRole::Miner => self.start_mining(tx),
            NodeRole::Relay => {
                let report = inner.peers.broadcast_except(MessageType::Gossip, payload, from).await?;
                Counters::bump(&inner.counters.transactions_relayed);
                debug!(tx_id = %tx.id, "Relayed to {} peers", report.succeeded.len());
            }
        }
        Ok(true)
    }

    /// Launch a cancellable search; the spawned task publishes the solution
    fn start_mining(&self, tx: Transaction) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .inner
            .active_mining
            .lock()
            .insert(tx.id.clone(), token.clone())
        {
            previous.cancel();
        }

        let job = MiningJob::for_transaction(&tx, self.inner.config.difficulty);
        let node = self.clone();
        tokio::spawn(async move {
            let outcome = node.inner.worker.mine(job, token).await;
            node.inner.active_mining.lock().remove(&tx.id);

            match outcome {
                Ok(solution) => node.publish_solution(&tx, solution).await,
                Err(Error::Cancelled { .. }) => {
                    debug!(tx_id = %tx.id, "Search cancelled");
                }
                Err(e) => warn!(tx_id = %tx.id, "Search failed: {}", e),
            }
        });
    }

    async fn publish_solution(&self, tx: &Transaction, solution: Solution) {
        let inner = &self.inner;
        let result = MinedResult::new(tx.id.clone(), solution);

        if !inner.finalized.insert(tx.id.clone()) || !inner.mempool.finalize(&result) {
            debug!(tx_id = %tx.id, "Transaction already finalized or abandoned, not announcing ours");
            return;
        }
        Counters::bump(&inner.counters.solutions_published);

        match inner.peers.broadcast(MessageType::Broadcast, result.to_wire()).await {
            Ok(report) => info!(
                tx_id = %tx.id,
                "Mined nonce {} ({}), announced to {} peers",
                result.nonce,
                result.hash,
                report.succeeded.len()
            ),
            Err(e) => warn!(tx_id = %tx.id, "Failed to announce mined result: {}", e),
        }
    }

    #[instrument(skip(self, payload))]
    async fn on_mined_result(&self, peer: &str, payload: Bytes) -> Result<()> {
        let inner = &self.inner;
        let result = MinedResult::from_wire(&payload)?;

        if inner.finalized.contains(&result.tx_id)
            || matches!(inner.mempool.state(&result.tx_id), Some(TxState::Finalized { .. }))
        {
            debug!(tx_id = %result.tx_id, "Result for finalized transaction dropped");
            return Ok(());
        }

        match inner.mempool.get(&result.tx_id) {
            Some(tx) => {
                self.try_finalize(&tx, result, peer).await;
            }
            // Seen but no longer pooled: abandoned, and a GOSSIP reply would be a duplicate
            None if inner.seen.contains(&result.tx_id) => {
                debug!(tx_id = %result.tx_id, "Result for abandoned transaction dropped");
            }
            None => {
                let tx_id = result.tx_id.clone();
                {
                    let mut parked = inner.parked_results.lock();
                    if parked.len() >= inner.config.seen_capacity && !parked.contains_key(&tx_id) {
                        warn!(tx_id = %tx_id, "Too many parked results, dropping");
                        return Ok(());
                    }
                    parked.insert(
                        tx_id.clone(),
                        ParkedResult {
                            announcer: peer.to_string(),
                            result,
                            parked_at: Instant::now(),
                        },
                    );
                }
                debug!(tx_id = %tx_id, "Result for unknown transaction, requesting it");
                inner
                    .peers
                    .send_to(peer, MessageType::RequestTx, tx_id.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// Verify `result` against `tx`; on success finalize, stop any local search
    /// and relay the result to everyone but `from`
    async fn try_finalize(&self, tx: &Transaction, result: MinedResult, from: &str) -> bool {
        let inner = &self.inner;

        if !crypto::verify(&tx.mining_payload(), result.nonce, &result.hash, inner.config.difficulty) {
            warn!(tx_id = %tx.id, peer = %from, "Rejected invalid mined result {}", result);
            Counters::bump(&inner.counters.results_rejected);
            return false;
        }

        if !inner.finalized.insert(tx.id.clone()) || !inner.mempool.finalize(&result) {
            return true;
        }
        Counters::bump(&inner.counters.results_accepted);
        info!(tx_id = %tx.id, "Transaction finalized by result from {}", from);

        if let Some(token) = inner.active_mining.lock().remove(&tx.id) {
            token.cancel();
            Counters::bump(&inner.counters.searches_cancelled);
            info!(tx_id = %tx.id, "Cancelled redundant local search");
        }

        if let Err(e) = inner
            .peers
            .broadcast_except(MessageType::Broadcast, result.to_wire(), Some(from))
            .await
        {
            warn!(tx_id = %tx.id, "Failed to relay mined result: {}", e);
        }
        true
    }

    async fn on_request_tx(&self, peer: &str, payload: Bytes) -> Result<()> {
        let text = String::from_utf8_lossy(&payload);
        let id = TxId::new(text.trim())?;

        match self.inner.mempool.get(&id) {
            Some(tx) => {
                debug!(tx_id = %id, "Answering transaction request from {}", peer);
                self.inner
                    .peers
                    .send_to(peer, MessageType::Gossip, tx.to_json_bytes()?)
                    .await
            }
            None => {
                debug!(tx_id = %id, "Requested transaction unknown");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessageHandler for GossipNode {
    async fn handle(&self, peer: &str, message_type: MessageType, payload: Bytes) -> Result<()> {
        match message_type {
            MessageType::Connect => {
                debug!("CONNECT from {}", peer);
                Ok(())
            }
            MessageType::Gossip => self.on_gossip(peer, payload).await,
            MessageType::Broadcast => self.on_mined_result(peer, payload).await,
            MessageType::RequestTx => self.on_request_tx(peer, payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{Direction, Frame, FrameCodec, PeerManagerConfig};
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{duplex, DuplexStream};
    use tokio_util::codec::FramedRead;

    /// Counts searches; optionally blocks until cancelled
    struct CountingWorker {
        calls: AtomicUsize,
        block: bool,
    }

    impl CountingWorker {
        fn new(block: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                block,
            })
        }
    }

    #[async_trait]
    impl MiningWorker for CountingWorker {
        fn worker_type(&self) -> &'static str {
            "counting"
        }

        async fn mine(&self, job: MiningJob, cancellation: CancellationToken) -> Result<Solution> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.block {
                cancellation.cancelled().await;
                return Err(Error::cancelled("test search"));
            }
            crypto::search(&job.payload, job.difficulty).ok_or_else(|| Error::mining("exhausted"))
        }
    }

    fn tx(id: &str) -> Transaction {
        Transaction {
            id: TxId::new(id).unwrap(),
            sender: "alice".into(),
            recipient: "bob".into(),
            amount: 10,
            timestamp: 1_700_000_000,
            pre_hash: "genesis".into(),
        }
    }

    fn node(role: NodeRole, worker: Arc<dyn MiningWorker>) -> GossipNode {
        let peers = Arc::new(PeerManager::new(PeerManagerConfig::new("node-under-test")));
        let config = GossipConfig {
            role,
            difficulty: Difficulty::new(1).unwrap(),
            seen_capacity: 1000,
            pending_ttl: Duration::from_secs(600),
        };
        GossipNode::new(config, peers, worker)
    }

    fn attach_peer(node: &GossipNode, key: &str) -> FramedRead<DuplexStream, FrameCodec> {
        let (local, remote) = duplex(64 * 1024);
        node.peers().attach(key, local, Direction::Inbound);
        FramedRead::new(remote, FrameCodec::default())
    }

    async fn next_frame(reader: &mut FramedRead<DuplexStream, FrameCodec>) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), reader.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame")
    }

    async fn assert_silent(reader: &mut FramedRead<DuplexStream, FrameCodec>) {
        let extra = tokio::time::timeout(Duration::from_millis(100), reader.next()).await;
        assert!(extra.is_err(), "unexpected extra frame");
    }

    fn gossip_payload(tx: &Transaction) -> Bytes {
        Bytes::from(tx.to_json_bytes().unwrap())
    }

    fn valid_result(tx: &Transaction) -> MinedResult {
        let solution = crypto::search(&tx.mining_payload(), Difficulty::new(1).unwrap()).unwrap();
        MinedResult::new(tx.id.clone(), solution)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition within timeout");
    }

    #[tokio::test]
    async fn test_duplicate_gossip_mines_once() {
        let worker = CountingWorker::new(true);
        let node = node(NodeRole::Miner, worker.clone());
        let payload = gossip_payload(&tx("tx1"));

        for _ in 0..5 {
            node.handle("peer-a", MessageType::Gossip, payload.clone()).await.unwrap();
        }

        wait_until(|| worker.calls.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.stats().duplicates_dropped, 4);
        assert!(node.is_mining(&TxId::new("tx1").unwrap()));
        node.cancel_all();
    }

    #[tokio::test]
    async fn test_duplicate_gossip_relays_once_and_not_to_sender() {
        let worker = CountingWorker::new(false);
        let node = node(NodeRole::Relay, worker.clone());
        let mut sender = attach_peer(&node, "peer-a");
        let mut other = attach_peer(&node, "peer-b");
        let payload = gossip_payload(&tx("tx1"));

        for _ in 0..3 {
            node.handle("peer-a", MessageType::Gossip, payload.clone()).await.unwrap();
        }

        let frame = next_frame(&mut other).await;
        assert_eq!(frame.message_type(), Some(MessageType::Gossip));
        assert_eq!(frame.payload, payload);
        assert_silent(&mut other).await;
        assert_silent(&mut sender).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(node.stats().transactions_relayed, 1);
    }

    #[tokio::test]
    async fn test_miner_publishes_verifiable_result() {
        let node = node(NodeRole::Miner, CountingWorker::new(false));
        let mut peer = attach_peer(&node, "peer-a");
        let tx = tx("tx1");

        node.handle("peer-z", MessageType::Gossip, gossip_payload(&tx)).await.unwrap();

        let frame = next_frame(&mut peer).await;
        assert_eq!(frame.message_type(), Some(MessageType::Broadcast));
        let result = MinedResult::from_wire(&frame.payload).unwrap();
        assert_eq!(result.tx_id, tx.id);
        assert!(crypto::verify(&tx.mining_payload(), result.nonce, &result.hash, Difficulty::new(1).unwrap()));
        wait_until(|| matches!(node.transaction_state(&tx.id), Some(TxState::Finalized { .. }))).await;
        assert_eq!(node.stats().solutions_published, 1);
    }

    #[tokio::test]
    async fn test_valid_result_finalizes_cancels_and_relays() {
        let worker = CountingWorker::new(true);
        let node = node(NodeRole::Miner, worker.clone());
        let mut announcer = attach_peer(&node, "peer-a");
        let mut other = attach_peer(&node, "peer-b");
        let tx = tx("tx1");

        node.handle("peer-a", MessageType::Gossip, gossip_payload(&tx)).await.unwrap();
        wait_until(|| worker.calls.load(Ordering::SeqCst) == 1).await;
        assert!(node.is_mining(&tx.id));

        let result = valid_result(&tx);
        node.handle("peer-a", MessageType::Broadcast, Bytes::from(result.to_wire()))
            .await
            .unwrap();

        assert_eq!(
            node.transaction_state(&tx.id),
            Some(TxState::Finalized { hash: result.hash.clone(), nonce: result.nonce })
        );
        assert!(!node.is_mining(&tx.id));
        assert_eq!(node.stats().searches_cancelled, 1);

        let relayed = next_frame(&mut other).await;
        assert_eq!(relayed.message_type(), Some(MessageType::Broadcast));
        assert_eq!(&relayed.payload[..], result.to_wire().as_bytes());
        assert_silent(&mut announcer).await;

        // A second copy of the same result is dropped without relaying
        node.handle("peer-b", MessageType::Broadcast, Bytes::from(result.to_wire()))
            .await
            .unwrap();
        assert_silent(&mut other).await;
        assert_eq!(node.stats().results_accepted, 1);
    }

    #[tokio::test]
    async fn test_invalid_result_rejected() {
        let node = node(NodeRole::Relay, CountingWorker::new(false));
        let mut other = attach_peer(&node, "peer-b");
        let tx = tx("tx1");
        node.submit(tx.clone()).await.unwrap();
        let _ = next_frame(&mut other).await;

        let mut forged = valid_result(&tx);
        forged.nonce += 1;
        node.handle("peer-a", MessageType::Broadcast, Bytes::from(forged.to_wire()))
            .await
            .unwrap();

        assert_eq!(node.transaction_state(&tx.id), Some(TxState::Pending));
        assert_eq!(node.stats().results_rejected, 1);
        assert_silent(&mut other).await;
    }

    #[tokio::test]
    async fn test_result_before_transaction_requests_it() {
        let worker = CountingWorker::new(true);
        let node = node(NodeRole::Miner, worker.clone());
        let mut announcer = attach_peer(&node, "peer-a");
        let tx = tx("tx-late");
        let result = valid_result(&tx);

        node.handle("peer-a", MessageType::Broadcast, Bytes::from(result.to_wire()))
            .await
            .unwrap();

        let request = next_frame(&mut announcer).await;
        assert_eq!(request.message_type(), Some(MessageType::RequestTx));
        assert_eq!(&request.payload[..], b"tx-late");

        node.handle("peer-a", MessageType::Gossip, gossip_payload(&tx)).await.unwrap();

        assert_matches!(node.transaction_state(&tx.id), Some(TxState::Finalized { .. }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    fn node_with(role: NodeRole, seen_capacity: usize, pending_ttl: Duration, worker: Arc<dyn MiningWorker>) -> GossipNode {
        let peers = Arc::new(PeerManager::new(PeerManagerConfig::new("node-under-test")));
        let config = GossipConfig {
            role,
            difficulty: Difficulty::new(1).unwrap(),
            seen_capacity,
            pending_ttl,
        };
        GossipNode::new(config, peers, worker)
    }

    #[tokio::test]
    async fn test_expired_parked_results_make_room() {
        let worker = CountingWorker::new(true);
        let node = node_with(NodeRole::Miner, 2, Duration::ZERO, worker.clone());
        let mut announcer = attach_peer(&node, "peer-a");

        for id in ["ghost-1", "ghost-2"] {
            let result = valid_result(&tx(id));
            node.handle("peer-a", MessageType::Broadcast, Bytes::from(result.to_wire()))
                .await
                .unwrap();
            assert_eq!(next_frame(&mut announcer).await.message_type(), Some(MessageType::RequestTx));
        }
        assert_eq!(node.parked_results(), 2);

        node.prune();
        assert_eq!(node.parked_results(), 0);

        // With room again, a genuine early result is parked and used
        let real = tx("real");
        let result = valid_result(&real);
        node.handle("peer-a", MessageType::Broadcast, Bytes::from(result.to_wire()))
            .await
            .unwrap();
        let request = next_frame(&mut announcer).await;
        assert_eq!(&request.payload[..], b"real");

        node.handle("peer-a", MessageType::Gossip, gossip_payload(&real)).await.unwrap();
        assert_matches!(node.transaction_state(&real.id), Some(TxState::Finalized { .. }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_for_abandoned_transaction_not_requested() {
        let node = node_with(NodeRole::Relay, 100, Duration::ZERO, CountingWorker::new(false));
        let mut peer = attach_peer(&node, "peer-b");
        let abandoned = tx("tx-abandoned");

        node.submit(abandoned.clone()).await.unwrap();
        let _ = next_frame(&mut peer).await;
        assert_eq!(node.prune(), 1);

        let result = valid_result(&abandoned);
        node.handle("peer-b", MessageType::Broadcast, Bytes::from(result.to_wire()))
            .await
            .unwrap();

        assert_silent(&mut peer).await;
        assert_eq!(node.parked_results(), 0);
        assert_eq!(node.transaction_state(&abandoned.id), None);
    }

    #[tokio::test]
    async fn test_late_duplicate_result_after_eviction_not_relayed() {
        let node = node_with(NodeRole::Relay, 1, Duration::from_secs(600), CountingWorker::new(false));
        let _announcer = attach_peer(&node, "peer-a");
        let mut other = attach_peer(&node, "peer-b");
        let first = tx("tx-first");
        let second = tx("tx-second");

        for tx in [&first, &second] {
            node.submit(tx.clone()).await.unwrap();
            let _ = next_frame(&mut other).await;
        }
        for tx in [&first, &second] {
            let result = valid_result(tx);
            node.handle("peer-a", MessageType::Broadcast, Bytes::from(result.to_wire()))
                .await
                .unwrap();
            let relayed = next_frame(&mut other).await;
            assert_eq!(relayed.message_type(), Some(MessageType::Broadcast));
        }
        assert_eq!(node.stats().results_accepted, 2);

        // The first id has been evicted from the bounded finalized set by now
        let late = valid_result(&first);
        node.handle("peer-a", MessageType::Broadcast, Bytes::from(late.to_wire()))
            .await
            .unwrap();

        assert_silent(&mut other).await;
        assert_eq!(node.stats().results_accepted, 2);
    }

    #[tokio::test]
    async fn test_request_tx_answered_with_gossip() {
        let node = node(NodeRole::Miner, CountingWorker::new(true));
        let mut requester = attach_peer(&node, "peer-a");
        let tx = tx("tx1");
        node.submit(tx.clone()).await.unwrap();

        node.handle("peer-a", MessageType::RequestTx, Bytes::from_static(b"tx1"))
            .await
            .unwrap();
        let reply = next_frame(&mut requester).await;
        assert_eq!(reply.message_type(), Some(MessageType::Gossip));
        assert_eq!(Transaction::from_json_bytes(&reply.payload).unwrap(), tx);

        node.handle("peer-a", MessageType::RequestTx, Bytes::from_static(b"unknown"))
            .await
            .unwrap();
        assert_silent(&mut requester).await;
        node.cancel_all();
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_errors_not_panics() {
        let node = node(NodeRole::Relay, CountingWorker::new(false));
        assert!(node.handle("p", MessageType::Gossip, Bytes::from_static(b"not json")).await.is_err());
        assert!(node.handle("p", MessageType::Broadcast, Bytes::from_static(b"tx1|zz")).await.is_err());
        assert!(node.handle("p", MessageType::RequestTx, Bytes::from_static(b"")).await.is_err());
        assert!(node.handle("p", MessageType::Connect, Bytes::from_static(b"node-x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_prune_abandons_and_cancels() {
        let worker = CountingWorker::new(true);
        let peers = Arc::new(PeerManager::new(PeerManagerConfig::new("n")));
        let config = GossipConfig {
            role: NodeRole::Miner,
            difficulty: Difficulty::new(1).unwrap(),
            seen_capacity: 10,
            pending_ttl: Duration::ZERO,
        };
        let node = GossipNode::new(config, peers, worker.clone());
        let tx = tx("tx-old");

        node.submit(tx.clone()).await.unwrap();
        wait_until(|| worker.calls.load(Ordering::SeqCst) == 1).await;

        assert_eq!(node.prune(), 1);
        assert!(!node.is_mining(&tx.id));
        assert_eq!(node.transaction_state(&tx.id), None);
        assert_eq!(node.stats().transactions_abandoned, 1);
    }
}

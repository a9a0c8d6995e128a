//! Pending-transaction pool
//!
//! Holds every transaction this node has accepted, pending until a valid mined
//! result finalizes it. Entries older than the TTL are pruned; pending ones
//! pruned this way are abandoned.

use crate::{MinedResult, Transaction, TxId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Finalized { hash: String, nonce: u64 },
}

#[derive(Debug, Clone)]
struct MempoolEntry {
    tx: Transaction,
    state: TxState,
    received_at: Instant,
}

/// Counts of pool entries by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MempoolCounts {
    pub pending: usize,
    pub finalized: usize,
}

#[derive(Default)]
pub struct Mempool {
    entries: Mutex<HashMap<TxId, MempoolEntry>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending transaction; `false` if the id is already present
    pub fn insert(&self, tx: Transaction) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&tx.id) {
            return false;
        }
        entries.insert(
            tx.id.clone(),
            MempoolEntry {
                tx,
                state: TxState::Pending,
                received_at: Instant::now(),
            },
        );
        true
    }

    pub fn get(&self, id: &TxId) -> Option<Transaction> {
        self.entries.lock().get(id).map(|entry| entry.tx.clone())
    }

    pub fn state(&self, id: &TxId) -> Option<TxState> {
        self.entries.lock().get(id).map(|entry| entry.state.clone())
    }

    /// Move a pending transaction to finalized; `false` if unknown or already final
    pub fn finalize(&self, result: &MinedResult) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&result.tx_id) {
            Some(entry) if entry.state == TxState::Pending => {
                entry.state = TxState::Finalized {
                    hash: result.hash.clone(),
                    nonce: result.nonce,
                };
                true
            }
            _ => false,
        }
    }

    /// Drop entries older than `ttl`, returning the ids of abandoned pending ones
    pub fn prune(&self, ttl: Duration) -> Vec<TxId> {
        let mut abandoned = Vec::new();
        self.entries.lock().retain(|id, entry| {
            if entry.received_at.elapsed() < ttl {
                return true;
            }
            if entry.state == TxState::Pending {
                abandoned.push(id.clone());
            }
            false
        });
        abandoned
    }

    pub fn counts(&self) -> MempoolCounts {
        let entries = self.entries.lock();
        let pending = entries
            .values()
            .filter(|entry| entry.state == TxState::Pending)
            .count();
        MempoolCounts {
            pending,
            finalized: entries.len() - pending,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

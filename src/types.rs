//! Core types for the powmesh network
//!
//! Transactions, mined results, difficulty levels and node descriptors with
//! validation and their JSON / wire representations.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used in the mined-result wire form
const RESULT_SEPARATOR: char = '|';

/// Transaction identifier
///
/// Identifiers are opaque strings; they must be non-empty and must not contain
/// the `|` separator used by mined-result announcements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxId(String);

impl TxId {
    /// Create a validated transaction id
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::protocol("Transaction id must not be empty"));
        }
        if id.contains(RESULT_SEPARATOR) {
            return Err(Error::protocol(format!(
                "Transaction id must not contain '{}'",
                RESULT_SEPARATOR
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TxId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Required number of leading zero hex characters in a winning digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    /// Hex length of a SHA-256 digest, the hardest satisfiable difficulty
    pub const MAX: u8 = 64;

    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX {
            return Err(Error::config(format!(
                "Difficulty must be between 0 and {}, got {}",
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Expected number of digest attempts (16^d)
    pub fn expected_attempts(&self) -> f64 {
        16f64.powi(self.0 as i32)
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transfer submitted by a wallet and propagated by gossip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    /// Unix seconds
    pub timestamp: i64,
    /// Reference to the prior transaction state
    pub pre_hash: String,
}

impl Transaction {
    /// Create a transaction stamped with the current time and a fresh id
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        pre_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: TxId::generate(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: Utc::now().timestamp(),
            pre_hash: pre_hash.into(),
        }
    }

    /// Canonical proof-of-work payload: pre-hash, sender, recipient, amount, timestamp
    pub fn mining_payload(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.pre_hash, self.sender, self.recipient, self.amount, self.timestamp
        )
    }

    /// Decode a GOSSIP payload
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(Error::from)
    }

    /// Encode as a GOSSIP payload
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::from)
    }
}

/// Outcome of a successful proof-of-work search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Lowercase hex digest
    pub hash: String,
    pub nonce: u64,
}

/// A solution announced for a particular transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedResult {
    pub tx_id: TxId,
    pub hash: String,
    pub nonce: u64,
}

impl MinedResult {
    pub fn new(tx_id: TxId, solution: Solution) -> Self {
        Self {
            tx_id,
            hash: solution.hash,
            nonce: solution.nonce,
        }
    }

    /// BROADCAST payload: `<txid>|<hash>|<nonce>`
    pub fn to_wire(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.tx_id,
            self.hash,
            self.nonce,
            sep = RESULT_SEPARATOR
        )
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::protocol(format!("Mined result is not UTF-8: {}", e)))?;
        text.parse()
    }
}

impl FromStr for MinedResult {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split(RESULT_SEPARATOR);
        let (Some(id), Some(hash), Some(nonce), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::protocol(format!(
                "Mined result must be '<txid>|<hash>|<nonce>', got '{}'",
                s
            )));
        };

        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::protocol(format!("Invalid hash in mined result: '{}'", hash)));
        }

        let nonce = nonce
            .parse::<u64>()
            .map_err(|e| Error::protocol(format!("Invalid nonce in mined result: {}", e)))?;

        Ok(Self {
            tx_id: TxId::new(id)?,
            hash: hash.to_ascii_lowercase(),
            nonce,
        })
    }
}

impl fmt::Display for MinedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Registration body a node sends to the seed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub ip: String,
    pub http_port: u16,
    /// Peer wire port, when it differs from the HTTP port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2p_port: Option<u16>,
}

impl NodeDescriptor {
    pub fn new(ip: impl Into<String>, http_port: u16, p2p_port: Option<u16>) -> Self {
        Self {
            ip: ip.into(),
            http_port,
            p2p_port,
        }
    }

    /// Registry key, also the liveness probe target
    pub fn key(&self) -> String {
        format!("{}:{}", self.ip, self.http_port)
    }

    /// Address other nodes dial for the peer wire protocol
    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.ip, self.p2p_port.unwrap_or(self.http_port))
    }

    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.ip, self.http_port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(Error::seed("Node descriptor has an empty ip"));
        }
        if self.http_port == 0 {
            return Err(Error::seed("Node descriptor has http_port 0"));
        }
        if self.p2p_port == Some(0) {
            return Err(Error::seed("Node descriptor has p2p_port 0"));
        }
        Ok(())
    }
}

/// A node tracked by the seed registry
#[derive(Debug, Clone, Serialize)]
pub struct TrackedNode {
    #[serde(flatten)]
    pub descriptor: NodeDescriptor,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

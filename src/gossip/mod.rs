//! Transaction gossip, mining hand-off and result finalization

pub mod mempool;
pub mod protocol;
pub mod seen;

pub use mempool::{Mempool, MempoolCounts, TxState};
pub use protocol::{GossipConfig, GossipNode, GossipStats};
pub use seen::SeenSet;

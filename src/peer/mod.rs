//! Peer connection layer: wire framing and the live connection set

pub mod frame;
pub mod manager;

pub use frame::{Frame, FrameCodec, MessageType, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use manager::{
    BroadcastReport, Direction, MessageHandler, PeerConnection, PeerManager, PeerManagerConfig,
    PeerSummary,
};

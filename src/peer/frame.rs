//! Peer wire framing
//!
//! Every message is `[u32 BE type][u32 BE length][payload]`. Lengths above
//! [`MAX_PAYLOAD_LEN`] are protocol violations and end the connection.

use crate::utils::format_bytes;
use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

pub const HEADER_LEN: usize = 8;

/// Safety ceiling on a single payload (16 MiB)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Known message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Peer identity announcement
    Connect = 0,
    /// Mined-result announcement
    Broadcast = 1,
    /// Transaction propagation
    Gossip = 2,
    /// Transaction lookup by id
    RequestTx = 3,
}

impl MessageType {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Connect),
            1 => Some(Self::Broadcast),
            2 => Some(Self::Gossip),
            3 => Some(Self::RequestTx),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Connect => write!(f, "CONNECT"),
            MessageType::Broadcast => write!(f, "BROADCAST"),
            MessageType::Gossip => write!(f, "GOSSIP"),
            MessageType::RequestTx => write!(f, "REQUEST_TX"),
        }
    }
}

/// One decoded message. The tag is kept raw so unknown types survive decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            tag: message_type.tag(),
            payload: payload.into(),
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_tag(self.tag)
    }

    /// Header plus payload as one contiguous buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        FrameCodec::default().encode(self.clone(), &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Length-prefixed codec for [`Frame`]s
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload_len: usize,
}

impl FrameCodec {
    pub fn new(max_payload_len: usize) -> Self {
        Self { max_payload_len }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_payload_len {
            return Err(Error::protocol(format!(
                "Payload of {} exceeds the {} ceiling",
                format_bytes(len),
                format_bytes(self.max_payload_len)
            )));
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let tag = BigEndian::read_u32(&src[0..4]);
        let len = BigEndian::read_u32(&src[4..8]) as usize;
        self.check_len(len)?;

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(HEADER_LEN + len);
        let payload = frame.split_off(HEADER_LEN).freeze();
        Ok(Some(Frame { tag, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::protocol(format!(
                "Stream closed inside a frame ({} buffered)",
                format_bytes(src.len())
            ))),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        self.check_len(frame.payload.len())?;

        let mut header = [0u8; HEADER_LEN];
        BigEndian::write_u32(&mut header[0..4], frame.tag);
        BigEndian::write_u32(&mut header[4..8], frame.payload.len() as u32);

        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_slice(&header);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

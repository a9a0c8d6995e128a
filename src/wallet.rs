//! Wallet-side transaction submission
//!
//! A wallet is a short-lived peer: it dials a node, announces itself with
//! CONNECT, sends one GOSSIP frame and hangs up.

use crate::client::SeedClient;
use crate::config::SubmitConfig;
use crate::peer::{Frame, FrameCodec, MessageType};
use crate::{Error, Result, Transaction};
use futures::SinkExt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tracing::{info, instrument};

/// Build a transaction from `config`, find a node and submit it
pub async fn submit(config: &SubmitConfig) -> Result<Transaction> {
    let tx = config.transaction()?;
    let node = resolve_node(config).await?;
    send_transaction(&node, &tx, config.connect_timeout()).await?;
    Ok(tx)
}

/// The explicit `--node`, or whatever node the seed directory offers
async fn resolve_node(config: &SubmitConfig) -> Result<String> {
    if let Some(node) = &config.node {
        return Ok(node.clone());
    }

    let url = config
        .seed_url()?
        .ok_or_else(|| Error::config("Either --node or --seed-url is required"))?;
    SeedClient::new(url, config.connect_timeout())?
        .send_only()
        .await?
        .ok_or_else(|| Error::seed("Seed directory has no nodes available"))
}

/// Deliver `tx` to the node at `addr` over the peer wire protocol
#[instrument(skip(tx), fields(tx_id = %tx.id))]
pub async fn send_transaction(addr: &str, tx: &Transaction, connect_timeout: Duration) -> Result<()> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::timeout(format!("connect to {}", addr)))?
        .map_err(|e| Error::peer(addr, format!("connect failed: {}", e)))?;

    let mut framed = FramedWrite::new(stream, FrameCodec::default());
    let identity = format!("wallet-{}", uuid::Uuid::new_v4().simple());
    framed.send(Frame::new(MessageType::Connect, identity)).await?;
    framed.send(Frame::new(MessageType::Gossip, tx.to_json_bytes()?)).await?;

    let mut stream = framed.into_inner();
    stream.shutdown().await?;

    info!("Submitted transaction to {}", addr);
    Ok(())
}

//! powmesh
//!
//! A gossip-based transaction relay and proof-of-work mining network:
//! - Seed directory service that on-boards nodes and evicts dead ones
//! - Length-prefixed peer wire protocol over persistent TCP streams
//! - Deduplicating flood-fill relay of transactions and mined results
//! - Cancellable SHA-256 proof-of-work search per transaction

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gossip;
pub mod node;
pub mod peer;
pub mod seed;
pub mod types;
pub mod utils;
pub mod wallet;
pub mod worker;

pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "powmesh";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

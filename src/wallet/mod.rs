//! Wallet management and cryptographic operations
//!
//! Holds the node's key pair, persists it across restarts and builds
//! signed payments from the outputs the key owns.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::{create_transaction, get_balance, Wallet};

//! Data storage and persistence
//!
//! The UTXO set derived from the chain, the pool of pending transactions
//! and the sled-backed store that keeps the chain across restarts.

pub mod chain_store;
pub mod memory_pool;
pub mod utxo_set;

pub use chain_store::ChainStore;
pub use memory_pool::MemoryPool;
pub use utxo_set::{UTXOSet, UnspentTxOut};

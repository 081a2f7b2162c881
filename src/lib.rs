//! # Ledger Node
//!
//! A small proof-of-work ledger node: an account-less UTXO chain with
//! ECDSA-signed transactions, a transaction pool, a single-key wallet and
//! gossip-based reconciliation with peers over TCP.
//!
//! ## Layout
//! - `core/`: blocks, transactions, validation rules, proof-of-work and difficulty
//! - `storage/`: the UTXO set, the transaction pool and the sled chain store
//! - `wallet/`: the node's key pair, balances and payment construction
//! - `node/`: the `Node` facade that serializes every ledger mutation
//! - `network/`: the peer protocol, peer registry, sync rules and TCP server
//! - `config/`: settings from defaults, TOML and environment
//! - `cli/`: argument parsing and the operator console
//! - `utils/`: hashing, signing and binary encoding helpers
//!
//! ## Where to start
//! 1. `core/blockchain.rs` for how blocks and chains are accepted
//! 2. `core/transaction.rs` for the spending rules
//! 3. `node/mod.rs` for mining and the operations a front end calls
//! 4. `network/sync.rs` for how peers converge on the heaviest chain

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{run_console, Command, Opt};
pub use config::Config;
pub use core::{
    is_valid_address, is_valid_block, is_valid_chain, is_valid_transaction, validate_block,
    validate_block_transactions, validate_chain, validate_coinbase, validate_transaction, Block,
    Blockchain, DifficultyAdjustment, ProofOfWork, Transaction, TxIn, TxOut, COINBASE_AMOUNT,
    GENESIS_BLOCK,
};
pub use error::{BlockchainError, Result};
pub use network::{handle_message, Message, Peer, PeerRegistry, PeerState, Server};
pub use node::Node;
pub use storage::{ChainStore, MemoryPool, UTXOSet, UnspentTxOut};
pub use utils::{
    current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, sha256_digest,
};
pub use wallet::{create_transaction, get_balance, Wallet};

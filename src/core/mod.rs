//! Core ledger functionality
//!
//! Blocks, transactions and their validation rules, the proof-of-work
//! search, difficulty retargeting and the `Blockchain` ledger that ties
//! them together.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_BLOCK};
pub use blockchain::{is_valid_block, is_valid_chain, validate_block, validate_chain, Blockchain};
pub use difficulty::DifficultyAdjustment;
pub use monetary::{
    BLOCK_GENERATION_INTERVAL, COINBASE_AMOUNT, DIFFICULTY_ADJUSTMENT_INTERVAL, TIMESTAMP_DRIFT,
};
pub use proof_of_work::ProofOfWork;
pub use transaction::{
    is_valid_address, is_valid_transaction, validate_block_transactions, validate_coinbase,
    validate_transaction, Transaction, TxIn, TxOut,
};

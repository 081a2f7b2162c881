use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Peer protocol messages, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", deny_unknown_fields)]
pub enum Message {
    QueryLatestBlock,
    QueryAllBlocks,
    ResponseBlocks(Vec<Block>),
    QueryTransactionPool,
    ResponseTransactionPool(Vec<Transaction>),
    NewBlock(Block),
    NewTransaction(Transaction),
}

impl Message {
    /// Encode as a single line, newline included
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Message> {
        let line = line.trim();
        if line.is_empty() {
            return Err(BlockchainError::Peer("Empty message".to_string()));
        }
        Ok(serde_json::from_str(line)?)
    }
}

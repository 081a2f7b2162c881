use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const GENESIS_TIMESTAMP: i64 = 1465154705;

const GENESIS_ADDRESS: &str = "04bfcab8722991ae774db48f934ca79cfb7dd991229153b9f732ba5334aafcd8e7266e47076996b55a14bf9913ee3145ce0cfc1372ada8ada74bd287450313534a";

/// The hardcoded first block every valid chain starts with
pub static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    Block::generate_genesis_block().expect("Genesis block is built from constant data")
});

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Block {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// An unmined block: nonce 0 and no hash yet
    pub fn new_template(
        index: u64,
        previous_hash: String,
        timestamp: i64,
        data: Vec<Transaction>,
        difficulty: u32,
    ) -> Block {
        Block {
            index,
            hash: String::new(),
            previous_hash,
            timestamp,
            data,
            difficulty,
            nonce: 0,
        }
    }

    fn generate_genesis_block() -> Result<Block> {
        let coinbase = Transaction::new_coinbase(GENESIS_ADDRESS, 0)?;
        let mut block = Block::new_template(0, String::new(), GENESIS_TIMESTAMP, vec![coinbase], 0);
        block.hash = block.calculate_hash()?;
        Ok(block)
    }

    pub fn calculate_hash(&self) -> Result<String> {
        Ok(ProofOfWork::new_proof_of_work(self)?.hash(self.nonce))
    }

    pub fn is_genesis(&self) -> bool {
        *self == *GENESIS_BLOCK
    }

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.data.iter().find(|tx| tx.id == id)
    }

    /// Field-level sanity checks that need no neighbouring block
    pub fn validate_structure(&self) -> Result<()> {
        if self.hash.len() != 64 {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} has a malformed hash",
                self.index
            )));
        }
        if self.index > 0 && self.previous_hash.len() != 64 {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} has a malformed previous hash",
                self.index
            )));
        }
        if self.data.is_empty() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} carries no coinbase",
                self.index
            )));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block_is_consistent() {
        let genesis = &*GENESIS_BLOCK;
        assert_eq!(genesis.index, 0);
        assert!(genesis.previous_hash.is_empty());
        assert_eq!(genesis.timestamp, GENESIS_TIMESTAMP);
        assert_eq!(genesis.calculate_hash().unwrap(), genesis.hash);
        assert!(ProofOfWork::validate(genesis));
        assert!(genesis.validate_structure().is_ok());
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let genesis = GENESIS_BLOCK.clone();
        let original = genesis.calculate_hash().unwrap();

        let mut changed = genesis.clone();
        changed.nonce += 1;
        assert_ne!(changed.calculate_hash().unwrap(), original);

        let mut changed = genesis.clone();
        changed.timestamp += 1;
        assert_ne!(changed.calculate_hash().unwrap(), original);

        let mut changed = genesis.clone();
        changed.data[0].tx_outs[0].amount += 1;
        assert_ne!(changed.calculate_hash().unwrap(), original);

        let mut changed = genesis;
        changed.previous_hash = "00".repeat(32);
        assert_ne!(changed.calculate_hash().unwrap(), original);
    }

    #[test]
    fn test_json_rejects_unknown_fields() {
        let mut value = serde_json::to_value(&*GENESIS_BLOCK).unwrap();
        assert!(value.get("previousHash").is_some());
        value["extra"] = serde_json::json!(1);
        assert!(serde_json::from_value::<Block>(value).is_err());
    }

    #[test]
    fn test_block_storage_encoding() {
        let bytes = GENESIS_BLOCK.serialize().unwrap();
        assert_eq!(Block::deserialize(&bytes).unwrap(), *GENESIS_BLOCK);
    }
}

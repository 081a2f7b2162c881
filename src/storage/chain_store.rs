use crate::core::Block;
use crate::error::{BlockchainError, Result};
use sled::{Batch, Db, Tree};
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";

/// On-disk copy of the accepted chain, one entry per block index
pub struct ChainStore {
    db: Db,
    blocks: Tree,
}

impl ChainStore {
    pub fn open(path: &Path) -> Result<ChainStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok(ChainStore { db, blocks })
    }

    /// Overwrite the stored chain with `chain` in one atomic batch
    pub fn save_chain(&self, chain: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for block in chain {
            batch.insert(block.index.to_be_bytes().to_vec(), block.serialize()?);
        }
        // a replaced chain may be shorter than the stored one
        let stale_from = (chain.len() as u64).to_be_bytes();
        for key in self.blocks.range(stale_from..).keys() {
            let key = key
                .map_err(|e| BlockchainError::Database(format!("Failed to scan blocks: {e}")))?;
            batch.remove(key);
        }

        self.blocks
            .apply_batch(batch)
            .map_err(|e| BlockchainError::Database(format!("Failed to write chain: {e}")))?;
        self.db.flush()?;
        Ok(())
    }

    /// The stored chain in index order, or `None` if nothing was saved yet
    pub fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let mut chain = vec![];
        for item in self.blocks.iter() {
            let (_, value) = item
                .map_err(|e| BlockchainError::Database(format!("Failed to read blocks: {e}")))?;
            chain.push(Block::deserialize(&value)?);
        }
        if chain.is_empty() {
            return Ok(None);
        }
        Ok(Some(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GENESIS_BLOCK;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store_has_no_chain() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChainStore::open(temp_dir.path()).unwrap();
        assert!(store.load_chain().unwrap().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let mut second = GENESIS_BLOCK.clone();
        second.index = 1;
        let chain = vec![GENESIS_BLOCK.clone(), second];

        {
            let store = ChainStore::open(temp_dir.path()).unwrap();
            store.save_chain(&chain).unwrap();
        }
        let store = ChainStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.load_chain().unwrap(), Some(chain));
    }

    #[test]
    fn test_shorter_chain_drops_stale_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChainStore::open(temp_dir.path()).unwrap();
        let mut long = vec![GENESIS_BLOCK.clone()];
        for index in 1..4 {
            let mut block = GENESIS_BLOCK.clone();
            block.index = index;
            long.push(block);
        }
        store.save_chain(&long).unwrap();
        store.save_chain(&long[..2]).unwrap();
        assert_eq!(store.load_chain().unwrap().unwrap().len(), 2);
    }
}

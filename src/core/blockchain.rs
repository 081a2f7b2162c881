use crate::core::{
    validate_block_transactions, Block, DifficultyAdjustment, ProofOfWork, Transaction,
    GENESIS_BLOCK, TIMESTAMP_DRIFT,
};
use crate::error::{BlockchainError, Result};
use crate::storage::{MemoryPool, UTXOSet};
use crate::utils::current_timestamp;
use log::{info, warn};
use num_bigint::BigUint;

/// The ledger: the accepted chain, the outputs it leaves unspent and the
/// transactions waiting to be mined.
///
/// Every mutation either applies completely or leaves all three untouched.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    utxo_set: UTXOSet,
    pool: MemoryPool,
}

impl Blockchain {
    /// A ledger holding only the genesis block
    pub fn new() -> Result<Blockchain> {
        Self::from_blocks(vec![GENESIS_BLOCK.clone()])
    }

    /// Adopt a stored or received chain after validating it from genesis
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Blockchain> {
        let utxo_set = validate_chain(&blocks)?;
        Ok(Blockchain {
            blocks,
            utxo_set,
            pool: MemoryPool::new(),
        })
    }

    pub fn get_blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get_latest_block(&self) -> &Block {
        // a chain is never empty: it always starts with genesis
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.hash == hash)
    }

    pub fn find_transaction(&self, id: &str) -> Option<&Transaction> {
        self.blocks.iter().find_map(|block| block.get_transaction(id))
    }

    pub fn get_utxo_set(&self) -> &UTXOSet {
        &self.utxo_set
    }

    pub fn get_pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn cumulative_difficulty(&self) -> BigUint {
        DifficultyAdjustment::cumulative_difficulty(&self.blocks)
    }

    /// The unmined successor of the current tip carrying `data`
    pub fn next_block_template(&self, data: Vec<Transaction>, timestamp: i64) -> Block {
        let latest = self.get_latest_block();
        Block::new_template(
            latest.index + 1,
            latest.hash.clone(),
            timestamp,
            data,
            DifficultyAdjustment::calculate_next_difficulty(&self.blocks),
        )
    }

    /// Append `block` on top of the current tip.
    ///
    /// The block is checked against the tip, the difficulty schedule and the
    /// current UTXO set; pooled transactions it consumes are evicted.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        validate_block(&block, self.get_latest_block(), current_timestamp()?)?;
        DifficultyAdjustment::validate_difficulty(&block, &self.blocks)?;
        validate_block_transactions(&block.data, &self.utxo_set, block.index)?;
        let utxo_set = self.utxo_set.process_block(&block.data, block.index)?;

        info!(
            "Added block {} at index {} ({} transactions)",
            block.hash,
            block.index,
            block.data.len()
        );
        self.blocks.push(block);
        self.utxo_set = utxo_set;
        self.pool.update(&self.utxo_set);
        Ok(())
    }

    /// Switch to `candidate` if it is valid and strictly heavier than the
    /// current chain. Returns whether the switch happened.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        let utxo_set = match validate_chain(&candidate) {
            Ok(utxo_set) => utxo_set,
            Err(e) => {
                warn!("Received chain is invalid: {e}");
                return false;
            }
        };

        let current = self.cumulative_difficulty();
        let received = DifficultyAdjustment::cumulative_difficulty(&candidate);
        if received <= current {
            info!("Received chain is not heavier ({received} <= {current}), keeping ours");
            return false;
        }

        info!(
            "Replacing chain: {} -> {} blocks (cumulative difficulty {current} -> {received})",
            self.blocks.len(),
            candidate.len()
        );
        self.blocks = candidate;
        self.utxo_set = utxo_set;
        self.pool.update(&self.utxo_set);
        true
    }

    pub fn add_to_pool(&mut self, tx: Transaction) -> Result<()> {
        self.pool.add(tx, &self.utxo_set)
    }
}

/// Check `block` as the direct successor of `previous`.
///
/// Covers linkage, the recomputed hash and its difficulty, and the timestamp
/// window relative to both the predecessor and `now`.
pub fn validate_block(block: &Block, previous: &Block, now: i64) -> Result<()> {
    block.validate_structure()?;
    if block.index != previous.index + 1 {
        return Err(BlockchainError::InvalidBlock(format!(
            "Expected index {}, got {}",
            previous.index + 1,
            block.index
        )));
    }
    if block.previous_hash != previous.hash {
        return Err(BlockchainError::InvalidBlock(format!(
            "Block {} does not link to {}",
            block.index, previous.hash
        )));
    }
    if !ProofOfWork::validate(block) {
        return Err(BlockchainError::InvalidBlock(format!(
            "Block {} has an invalid hash for difficulty {}",
            block.index, block.difficulty
        )));
    }
    if !(previous.timestamp - TIMESTAMP_DRIFT < block.timestamp
        && block.timestamp - TIMESTAMP_DRIFT < now)
    {
        return Err(BlockchainError::InvalidBlock(format!(
            "Block {} timestamp {} is outside the accepted window",
            block.index, block.timestamp
        )));
    }
    Ok(())
}

pub fn is_valid_block(block: &Block, previous: &Block) -> bool {
    current_timestamp()
        .and_then(|now| validate_block(block, previous, now))
        .is_ok()
}

/// Validate a whole chain from genesis and return the UTXO set it leaves
pub fn validate_chain(chain: &[Block]) -> Result<UTXOSet> {
    let genesis = chain
        .first()
        .ok_or_else(|| BlockchainError::InvalidChain("Chain is empty".to_string()))?;
    if !genesis.is_genesis() {
        return Err(BlockchainError::InvalidChain(
            "Chain does not start with the genesis block".to_string(),
        ));
    }

    let now = current_timestamp()?;
    let mut utxo_set = UTXOSet::new().process_block(&genesis.data, genesis.index)?;
    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, block) = (&pair[0], &pair[1]);
        let check = validate_block(block, previous, now)
            .and_then(|_| DifficultyAdjustment::validate_difficulty(block, &chain[..=position]))
            .and_then(|_| validate_block_transactions(&block.data, &utxo_set, block.index))
            .and_then(|_| utxo_set.process_block(&block.data, block.index));
        utxo_set = check.map_err(|e| {
            BlockchainError::InvalidChain(format!("Block {} rejected: {e}", block.index))
        })?;
    }
    Ok(utxo_set)
}

pub fn is_valid_chain(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}

use crate::core::Block;
use crate::error::Result;
use crate::utils::{serialize, sha256_digest};
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Nonces tried between two polls of the cancellation check
const CANCEL_CHECK_INTERVAL: u64 = 1024;

const HASH_BITS: u32 = 256;

pub struct ProofOfWork {
    index: u64,
    previous_hash: String,
    timestamp: i64,
    data_digest: Vec<u8>,
    difficulty: u32,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> Result<ProofOfWork> {
        Ok(ProofOfWork {
            index: block.index,
            previous_hash: block.previous_hash.clone(),
            timestamp: block.timestamp,
            data_digest: sha256_digest(&serialize(&block.data)?),
            difficulty: block.difficulty,
            target: Self::target(block.difficulty),
        })
    }

    /// 2^(256 - difficulty); a hash below it has at least `difficulty` leading zero bits
    fn target(difficulty: u32) -> BigInt {
        let mut target = BigInt::from(1);
        target.shl_assign(HASH_BITS - difficulty.min(HASH_BITS));
        target
    }

    pub fn hash_matches_difficulty(hash: &[u8], difficulty: u32) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < Self::target(difficulty)
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.index.to_be_bytes());
        data_bytes.extend(self.previous_hash.as_bytes());
        data_bytes.extend(self.timestamp.to_be_bytes());
        data_bytes.extend(&self.data_digest);
        data_bytes.extend(self.difficulty.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    pub fn hash(&self, nonce: u64) -> String {
        HEXLOWER.encode(&sha256_digest(&self.prepare_data(nonce)))
    }

    /// The declared hash recomputes and satisfies the declared difficulty
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow,
            Err(e) => {
                log::debug!("Cannot hash block {}: {e}", block.index);
                return false;
            }
        };
        let hash = sha256_digest(&pow.prepare_data(block.nonce));
        HEXLOWER.encode(&hash) == block.hash && Self::hash_matches_difficulty(&hash, pow.difficulty)
    }

    /// Run the search for `block` and fill in its nonce and hash
    pub fn mine<F>(mut block: Block, is_cancelled: F) -> Result<Option<Block>>
    where
        F: FnMut() -> bool,
    {
        let pow = ProofOfWork::new_proof_of_work(&block)?;
        Ok(pow.run(is_cancelled).map(|(nonce, hash)| {
            block.nonce = nonce;
            block.hash = hash;
            block
        }))
    }

    /// Search nonces upward from 0. Returns `None` once `is_cancelled` reports
    /// true or the nonce space runs out.
    pub fn run<F>(&self, mut is_cancelled: F) -> Option<(u64, String)>
    where
        F: FnMut() -> bool,
    {
        let mut nonce = 0u64;
        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
                log::info!("Proof-of-work for block {} cancelled at nonce {nonce}", self.index);
                return None;
            }
            let hash = sha256_digest(&self.prepare_data(nonce));
            if BigInt::from_bytes_be(Sign::Plus, &hash) < self.target {
                return Some((nonce, HEXLOWER.encode(&hash)));
            }
            nonce = nonce.checked_add(1)?;
        }
    }
}

use crate::core::{Block, BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL};
use crate::error::{BlockchainError, Result};
use log::info;
use num_bigint::BigUint;

/// Difficulty retargeting and chain weight
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Difficulty required for the block that would extend `chain`.
    ///
    /// Retargets only when the latest block sits on a non-zero multiple of the
    /// adjustment interval; otherwise the latest difficulty carries over.
    pub fn calculate_next_difficulty(chain: &[Block]) -> u32 {
        let latest = match chain.last() {
            Some(block) => block,
            None => return 0,
        };
        if latest.index == 0 || latest.index % DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
            return latest.difficulty;
        }
        let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
        if chain.len() < interval {
            return latest.difficulty;
        }

        let reference = &chain[chain.len() - interval];
        let expected = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
        let taken = latest.timestamp - reference.timestamp;
        let next = Self::adjust_difficulty(reference.difficulty, taken, expected);

        if next != reference.difficulty {
            info!(
                "Difficulty adjustment after block {}: {} -> {next} (taken: {taken}s, expected: {expected}s)",
                latest.index, reference.difficulty
            );
        }
        next
    }

    fn adjust_difficulty(current: u32, taken: i64, expected: i64) -> u32 {
        if taken < expected / 2 {
            current.saturating_add(1)
        } else if taken > expected * 2 {
            current.saturating_sub(1)
        } else {
            current
        }
    }

    /// `block` must declare the difficulty its predecessors call for
    pub fn validate_difficulty(block: &Block, predecessors: &[Block]) -> Result<()> {
        let expected = Self::calculate_next_difficulty(predecessors);
        if block.difficulty != expected {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} declares difficulty {} but {expected} is required",
                block.index, block.difficulty
            )));
        }
        Ok(())
    }

    /// Sum of 2^difficulty over every block; the fork-choice weight
    pub fn cumulative_difficulty(chain: &[Block]) -> BigUint {
        chain.iter().fold(BigUint::from(0u32), |acc, block| {
            acc + (BigUint::from(1u32) << block.difficulty)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_chain(timestamps: &[i64], difficulty: u32) -> Vec<Block> {
        timestamps
            .iter()
            .enumerate()
            .map(|(index, timestamp)| {
                Block::new_template(index as u64, String::new(), *timestamp, vec![], difficulty)
            })
            .collect()
    }

    fn spaced(count: usize, spacing: i64) -> Vec<i64> {
        (0..count as i64).map(|i| 1_000 + i * spacing).collect()
    }

    #[test]
    fn test_empty_and_genesis_chains() {
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&[]), 0);
        let genesis_only = create_test_chain(&[1_000], 3);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&genesis_only), 3);
    }

    #[test]
    fn test_difficulty_inherited_between_boundaries() {
        let chain = create_test_chain(&spaced(7, 1), 2);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&chain), 2);
    }

    #[test]
    fn test_compressed_interval_increases_difficulty() {
        // 11 blocks, latest index 10; 9s elapsed against 100s expected
        let chain = create_test_chain(&spaced(11, 1), 4);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&chain), 5);
    }

    #[test]
    fn test_stretched_interval_decreases_difficulty() {
        // 9 gaps of 30s = 270s > 200s
        let chain = create_test_chain(&spaced(11, 30), 4);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&chain), 3);

        let floor = create_test_chain(&spaced(11, 30), 0);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&floor), 0);
    }

    #[test]
    fn test_on_schedule_interval_keeps_difficulty() {
        let chain = create_test_chain(&spaced(11, 10), 4);
        assert_eq!(DifficultyAdjustment::calculate_next_difficulty(&chain), 4);
    }

    #[test]
    fn test_validate_difficulty() {
        let chain = create_test_chain(&spaced(11, 1), 4);
        let mut next = Block::new_template(11, String::new(), 2_000, vec![], 5);
        assert!(DifficultyAdjustment::validate_difficulty(&next, &chain).is_ok());
        next.difficulty = 4;
        assert!(DifficultyAdjustment::validate_difficulty(&next, &chain).is_err());
    }

    #[test]
    fn test_cumulative_difficulty() {
        let mut chain = create_test_chain(&spaced(3, 10), 0);
        assert_eq!(DifficultyAdjustment::cumulative_difficulty(&chain), BigUint::from(3u32));
        chain[2].difficulty = 4;
        assert_eq!(DifficultyAdjustment::cumulative_difficulty(&chain), BigUint::from(18u32));
    }
}

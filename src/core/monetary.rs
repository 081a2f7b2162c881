//! Monetary and timing constants of the chain

/// Amount minted by every block's coinbase transaction
pub const COINBASE_AMOUNT: u64 = 50;

/// Target seconds between blocks
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Tolerated clock skew, in seconds, between neighbouring blocks and against local time
pub const TIMESTAMP_DRIFT: i64 = 60;

use super::block::Block;
use super::validation::validate_chain;
use serde::{Deserialize, Serialize};

/// Summary of the live chain. Never cached: `is_valid` is recomputed on
/// every call so it reflects the chain as it is now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    pub total_blocks: usize,
    pub difficulty: u32,
    pub is_valid: bool,
    pub latest_block_hash: String,
}

impl ChainStats {
    pub fn compute(blocks: &[Block], difficulty: u32) -> Self {
        ChainStats {
            total_blocks: blocks.len(),
            difficulty,
            is_valid: validate_chain(blocks, difficulty).is_ok(),
            latest_block_hash: blocks.last().map(|b| b.hash.clone()).unwrap_or_default(),
        }
    }
}

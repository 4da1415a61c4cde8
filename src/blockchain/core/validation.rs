use super::block::Block;
use super::chain::GENESIS_PREVIOUS_HASH;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` does not match the predecessor's hash.
    LinkMismatch,
    /// Hash lacks the required leading zeros.
    InsufficientWork,
    /// Block index does not equal its position.
    IndexMismatch,
}

/// First failing block and the check it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub index: usize,
    pub check: ValidationCheck,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self.check {
            ValidationCheck::HashMismatch => "stored hash does not match recomputed hash",
            ValidationCheck::LinkMismatch => "previous hash does not link to predecessor",
            ValidationCheck::InsufficientWork => "hash does not meet difficulty target",
            ValidationCheck::IndexMismatch => "index does not match chain position",
        };
        write!(f, "block {}: {}", self.index, reason)
    }
}

/// Re-walks `blocks`, recomputing every hash independently of mining.
/// Stops at the first failure. An empty chain is valid.
pub fn validate_chain(blocks: &[Block], difficulty: u32) -> Result<(), ValidationFailure> {
    let Some(genesis) = blocks.first() else {
        return Ok(());
    };
    validate_block(genesis, 0, GENESIS_PREVIOUS_HASH, difficulty)?;

    for (i, pair) in blocks.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        validate_block(current, i + 1, &previous.hash, difficulty)?;
    }
    Ok(())
}

fn validate_block(
    block: &Block,
    position: usize,
    expected_previous: &str,
    difficulty: u32,
) -> Result<(), ValidationFailure> {
    let fail = |check: ValidationCheck| -> Result<(), ValidationFailure> {
        Err(ValidationFailure { index: position, check })
    };

    if block.hash != block.recompute_hash() {
        return fail(ValidationCheck::HashMismatch);
    }
    if block.previous_hash != expected_previous {
        return fail(ValidationCheck::LinkMismatch);
    }
    if !block.meets_difficulty(difficulty) {
        return fail(ValidationCheck::InsufficientWork);
    }
    if block.index != position as u64 {
        return fail(ValidationCheck::IndexMismatch);
    }
    Ok(())
}

use super::block::{Block, BlockPayload, SealedPayload};
use super::stats::ChainStats;
use super::validation::{validate_chain, ValidationFailure};
use crate::crypto::{CryptoService, HashAlgorithm};
use crate::error::ChainError;
use crate::miner::{mine_block, MiningControl};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_DIFFICULTY: u32 = 4;
/// A SHA-256 hex digest has 64 characters.
pub const MAX_DIFFICULTY: u32 = 64;
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Unix time in milliseconds. A clock set before the epoch reads as 0.
pub fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

pub fn check_difficulty(difficulty: u32) -> Result<(), ChainError> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidConfig(format!(
            "difficulty must be between 1 and {}, got {}",
            MAX_DIFFICULTY, difficulty
        )));
    }
    Ok(())
}

/// A decrypted ledger entry together with the outcome of re-checking its seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedRecord {
    pub index: u64,
    pub record: String,
    pub signature_valid: bool,
    pub content_hash_valid: bool,
}

impl OpenedRecord {
    pub fn is_authentic(&self) -> bool {
        self.signature_valid && self.content_hash_valid
    }
}

/// Append-only chain of sealed, mined blocks.
///
/// A `Ledger` only exists once its genesis block has been mined, and blocks
/// are never mutated or removed after [`Ledger::commit`].
pub struct Ledger {
    chain: Vec<Block>,
    difficulty: u32,
    crypto: Arc<CryptoService>,
}

impl Ledger {
    pub fn new(crypto: Arc<CryptoService>, difficulty: u32) -> Result<Self, ChainError> {
        Self::with_control(crypto, difficulty, &MiningControl::new())
    }

    /// Like [`Ledger::new`], with genesis mining bound to `control`.
    pub fn with_control(
        crypto: Arc<CryptoService>,
        difficulty: u32,
        control: &MiningControl,
    ) -> Result<Self, ChainError> {
        check_difficulty(difficulty)?;
        let genesis = Self::create_genesis(difficulty, control)?;
        info!(difficulty, hash = %genesis.hash, "ledger initialized with genesis block");

        Ok(Ledger {
            chain: vec![genesis],
            difficulty,
            crypto,
        })
    }

    fn create_genesis(difficulty: u32, control: &MiningControl) -> Result<Block, ChainError> {
        let genesis = Block::new(
            0,
            current_timestamp(),
            BlockPayload::genesis(),
            GENESIS_PREVIOUS_HASH.to_string(),
        );
        mine_block(genesis, difficulty, control)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn crypto(&self) -> &Arc<CryptoService> {
        &self.crypto
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: genesis is present from construction.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    pub fn latest_block(&self) -> &Block {
        // Genesis is pushed in the constructor, so the chain is never empty.
        &self.chain[self.chain.len() - 1]
    }

    /// Encrypts, signs and hashes `record`. Any crypto failure becomes
    /// [`ChainError::Sealing`].
    pub fn seal(&self, record: &str) -> Result<SealedPayload, ChainError> {
        if record.is_empty() {
            return Err(ChainError::EmptyRecord);
        }
        let content_hash = self.crypto.hash(record, HashAlgorithm::Sha256);
        let signature = self.crypto.sign(record).map_err(ChainError::Sealing)?;
        let encrypted_data = self
            .crypto
            .asymmetric_encrypt(record)
            .map_err(ChainError::Sealing)?;

        Ok(SealedPayload {
            content_hash,
            encrypted_data,
            signature,
        })
    }

    /// Seals `record` into an unmined block on top of the current tip.
    pub fn prepare_block(&self, record: &str) -> Result<Block, ChainError> {
        let sealed = self.seal(record).inspect_err(|err| {
            warn!("record rejected before mining: {}", err);
        })?;
        let last = self.latest_block();
        let timestamp = current_timestamp().max(last.timestamp);

        Ok(Block::new(
            last.index + 1,
            timestamp,
            BlockPayload::Sealed(sealed),
            last.hash.clone(),
        ))
    }

    /// Appends a mined block after checking it against the current tip.
    pub fn commit(&mut self, block: Block) -> Result<&Block, ChainError> {
        let last = self.latest_block();

        if block.index != last.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                last.index + 1,
                block.index
            )));
        }
        if block.previous_hash != last.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid previous block hash. Expected {}, but got {}.",
                last.hash, block.previous_hash
            )));
        }
        if block.timestamp < last.timestamp {
            return Err(ChainError::InvalidBlock(format!(
                "Timestamp {} precedes previous block timestamp {}.",
                block.timestamp, last.timestamp
            )));
        }
        if block.hash != block.recompute_hash() {
            return Err(ChainError::InvalidBlock(
                "Stored hash does not match block contents.".to_string(),
            ));
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::InvalidBlock(
                "Invalid Proof-of-Work: Block hash does not meet difficulty target.".to_string(),
            ));
        }

        info!(index = block.index, hash = %block.hash, "block appended");
        self.chain.push(block);
        Ok(self.latest_block())
    }

    /// Seal, mine and append in one step. On any error the chain is unchanged.
    pub fn append(&mut self, record: &str, control: &MiningControl) -> Result<Block, ChainError> {
        let candidate = self.prepare_block(record)?;
        let mined = mine_block(candidate, self.difficulty, control)?;
        self.commit(mined).cloned()
    }

    pub fn validate(&self) -> bool {
        self.validation_report().is_ok()
    }

    pub fn validation_report(&self) -> Result<(), ValidationFailure> {
        validate_chain(&self.chain, self.difficulty).inspect_err(|failure| {
            warn!(index = failure.index, check = ?failure.check, "chain validation failed");
        })
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats::compute(&self.chain, self.difficulty)
    }

    /// Decrypts a sealed block and re-checks its signature and content hash.
    pub fn open_block(&self, index: u64) -> Result<OpenedRecord, ChainError> {
        let block = self.block(index).ok_or(ChainError::BlockNotFound(index))?;
        let sealed = block.sealed_payload().ok_or(ChainError::NotSealed(index))?;

        let record = self.crypto.asymmetric_decrypt(&sealed.encrypted_data)?;
        let signature_valid = self.crypto.verify(&record, &sealed.signature);
        let content_hash_valid =
            self.crypto.hash(&record, HashAlgorithm::Sha256) == sealed.content_hash;

        Ok(OpenedRecord {
            index,
            record,
            signature_valid,
            content_hash_valid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{ValidationCheck, GENESIS_PAYLOAD};
    use crate::crypto::TEST_SERVICE;
    use crate::error::CryptoError;

    fn ledger(difficulty: u32) -> Ledger {
        Ledger::new(TEST_SERVICE.clone(), difficulty).unwrap()
    }

    fn three_block_ledger() -> Ledger {
        let mut ledger = ledger(1);
        ledger.append(r#"{"a":1}"#, &MiningControl::new()).unwrap();
        ledger.append(r#"{"b":2}"#, &MiningControl::new()).unwrap();
        ledger
    }

    #[test]
    fn test_genesis_block() {
        let ledger = ledger(2);
        let genesis = &ledger.blocks()[0];

        assert_eq!(ledger.len(), 1);
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.payload, BlockPayload::Genesis(GENESIS_PAYLOAD.to_string()));
        assert!(genesis.hash.starts_with("00"));
        assert!(ledger.validate());
    }

    #[test]
    fn test_append_scenario() {
        let mut ledger = ledger(2);
        let genesis_hash = ledger.latest_block().hash.clone();

        let block = ledger.append(r#"{"a":1}"#, &MiningControl::new()).unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, genesis_hash);
        assert!(block.hash.starts_with("00"));
        assert_eq!(ledger.latest_block(), &block);
        assert!(ledger.validate());
    }

    #[test]
    fn test_sealed_payload_derives_from_record() {
        let mut ledger = ledger(1);
        let record = r#"{"patient":"p-17","reading":98.6}"#;
        let block = ledger.append(record, &MiningControl::new()).unwrap();
        let sealed = block.sealed_payload().unwrap();

        let crypto = ledger.crypto();
        assert_eq!(sealed.content_hash, crypto.hash(record, HashAlgorithm::Sha256));
        assert!(crypto.verify(record, &sealed.signature));
        assert_eq!(crypto.asymmetric_decrypt(&sealed.encrypted_data).unwrap(), record);
    }

    #[test]
    fn test_indices_match_positions() {
        let ledger = three_block_ledger();
        for (i, block) in ledger.blocks().iter().enumerate() {
            assert_eq!(block.index, i as u64);
        }
        assert!(ledger
            .blocks()
            .windows(2)
            .all(|pair| pair[1].timestamp >= pair[0].timestamp));
    }

    #[test]
    fn test_oversized_record_leaves_chain_untouched() {
        let mut ledger = ledger(1);
        let before = ledger.blocks().to_vec();
        let record = "x".repeat(ledger.crypto().max_asymmetric_payload() + 1);

        let result = ledger.append(&record, &MiningControl::new());

        assert!(matches!(
            result,
            Err(ChainError::Sealing(CryptoError::PayloadTooLarge { .. }))
        ));
        assert_eq!(ledger.blocks(), before.as_slice());
    }

    #[test]
    fn test_empty_record_rejected() {
        let mut ledger = ledger(1);
        assert_eq!(
            ledger.append("", &MiningControl::new()),
            Err(ChainError::EmptyRecord)
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_cancelled_append_appends_nothing() {
        let mut ledger = ledger(1);
        let control = MiningControl::new();
        control.cancel();

        // A candidate can qualify at nonce 0 without searching; every other
        // attempt must stop without touching the chain.
        let mut cancelled = 0;
        for attempt in 0..8 {
            let before = ledger.len();
            match ledger.append(&format!("late {}", attempt), &control) {
                Ok(_) => assert_eq!(ledger.len(), before + 1),
                Err(err) => {
                    assert_eq!(err, ChainError::MiningCancelled);
                    assert_eq!(ledger.len(), before);
                    cancelled += 1;
                }
            }
        }
        assert!(cancelled > 0);
        assert!(ledger.validate());
    }

    #[test]
    fn test_cancelled_genesis_yields_no_ledger() {
        let control = MiningControl::new();
        control.cancel();
        let result = Ledger::with_control(TEST_SERVICE.clone(), MAX_DIFFICULTY, &control);
        assert!(matches!(result, Err(ChainError::MiningCancelled)));
    }

    #[test]
    fn test_commit_rejects_stale_candidate() {
        let mut ledger = ledger(1);
        let stale = ledger.prepare_block("first").unwrap();
        ledger.append("second", &MiningControl::new()).unwrap();

        let stale = mine_block(stale, 1, &MiningControl::new()).unwrap();
        assert!(matches!(ledger.commit(stale), Err(ChainError::InvalidBlock(_))));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_commit_rejects_unmined_block() {
        let mut ledger = ledger(3);
        let mut candidate = ledger.prepare_block("unmined").unwrap();
        while candidate.meets_difficulty(3) {
            candidate.nonce += 1;
            candidate.hash = candidate.recompute_hash();
        }
        assert!(matches!(ledger.commit(candidate), Err(ChainError::InvalidBlock(_))));
    }

    #[test]
    fn test_tampered_previous_hash_invalidates_chain() {
        let mut ledger = three_block_ledger();
        assert!(ledger.validate());

        ledger.chain[1].previous_hash = "ab".repeat(32);

        assert!(!ledger.validate());
        assert_eq!(ledger.validation_report().unwrap_err().index, 1);
    }

    #[test]
    fn test_tampering_any_field_is_detected() {
        let tamperers: Vec<fn(&mut Block)> = vec![
            |b: &mut Block| b.index += 10,
            |b: &mut Block| b.timestamp += 1,
            |b: &mut Block| b.nonce += 1,
            |b: &mut Block| b.hash = "0".repeat(64),
            |b: &mut Block| {
                if let BlockPayload::Sealed(sealed) = &mut b.payload {
                    sealed.content_hash = "00".repeat(32);
                }
            },
        ];

        for tamper in tamperers {
            let mut ledger = three_block_ledger();
            tamper(&mut ledger.chain[1]);
            assert!(!ledger.validate());
        }
    }

    #[test]
    fn test_remined_tampered_block_breaks_link() {
        let mut ledger = three_block_ledger();
        let mut forged = ledger.chain[1].clone();
        forged.timestamp += 1;
        ledger.chain[1] = mine_block(forged, 1, &MiningControl::new()).unwrap();

        let failure = ledger.validation_report().unwrap_err();
        assert_eq!(failure.index, 2);
        assert_eq!(failure.check, ValidationCheck::LinkMismatch);
    }

    #[test]
    fn test_stats_reflect_live_chain() {
        let mut ledger = three_block_ledger();
        let stats = ledger.stats();
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.difficulty, 1);
        assert!(stats.is_valid);
        assert_eq!(stats.latest_block_hash, ledger.latest_block().hash);

        ledger.chain[1].nonce += 1;
        assert!(!ledger.stats().is_valid);
    }

    #[test]
    fn test_open_block() {
        let ledger = three_block_ledger();
        let opened = ledger.open_block(2).unwrap();
        assert_eq!(opened.record, r#"{"b":2}"#);
        assert!(opened.is_authentic());

        assert_eq!(ledger.open_block(0), Err(ChainError::NotSealed(0)));
        assert_eq!(ledger.open_block(9), Err(ChainError::BlockNotFound(9)));
    }

    #[test]
    fn test_current_timestamp_is_unix_millis() {
        let now = current_timestamp();
        // 2020-09-13 in milliseconds; a seconds or wrapped value fails either bound.
        assert!(now > 1_600_000_000_000);
        assert!(now < 10_000_000_000_000);
        assert!(current_timestamp() >= now);
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(matches!(
            Ledger::new(TEST_SERVICE.clone(), 0),
            Err(ChainError::InvalidConfig(_))
        ));
        assert!(matches!(
            Ledger::new(TEST_SERVICE.clone(), MAX_DIFFICULTY + 1),
            Err(ChainError::InvalidConfig(_))
        ));
    }
}

use crate::crypto::{hash_hex, HashAlgorithm};
use crate::error::ChainError;
use crate::miner::{MiningControl, MINING_CHECK_INTERVAL};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Payload carried by the genesis block.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";

/// Encrypted, signed and hashed form of one caller record. All three fields
/// are derived from the same plaintext at seal time and never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub content_hash: String,
    pub encrypted_data: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockPayload {
    Genesis(String),
    Sealed(SealedPayload),
}

impl BlockPayload {
    pub fn genesis() -> Self {
        BlockPayload::Genesis(GENESIS_PAYLOAD.to_string())
    }

    fn canonical_value(&self) -> Value {
        match self {
            BlockPayload::Genesis(sentinel) => Value::String(sentinel.clone()),
            BlockPayload::Sealed(sealed) => json!({
                "content_hash": sealed.content_hash,
                "encrypted_data": sealed.encrypted_data,
                "signature": sealed.signature,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Unix time in milliseconds.
    pub timestamp: u64,
    pub payload: BlockPayload,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(index: u64, timestamp: u64, payload: BlockPayload, previous_hash: String) -> Self {
        Self::with_nonce(index, timestamp, payload, previous_hash, 0)
    }

    pub fn with_nonce(
        index: u64,
        timestamp: u64,
        payload: BlockPayload,
        previous_hash: String,
        nonce: u64,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            payload,
            previous_hash,
            nonce,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// Compact JSON of `data`, `index`, `nonce`, `previous_hash` and
    /// `timestamp` with keys in sorted order. Mining and validation both hash
    /// exactly these bytes.
    pub fn canonical_serialization(&self) -> String {
        json!({
            "data": self.payload.canonical_value(),
            "index": self.index,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
        })
        .to_string()
    }

    pub fn recompute_hash(&self) -> String {
        hash_hex(self.canonical_serialization().as_bytes(), HashAlgorithm::Sha256)
    }

    pub fn sealed_payload(&self) -> Option<&SealedPayload> {
        match &self.payload {
            BlockPayload::Sealed(sealed) => Some(sealed),
            BlockPayload::Genesis(_) => None,
        }
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Brute-force nonce search until the hash carries `difficulty` leading
    /// zero hex digits. Returns the winning nonce.
    ///
    /// `control` is polled every [`MINING_CHECK_INTERVAL`] attempts; on
    /// cancellation or deadline the block is left partially mined and must
    /// be discarded by the caller.
    pub fn mine(&mut self, difficulty: u32, control: &MiningControl) -> Result<u64, ChainError> {
        let mut attempts: u64 = 0;
        while !self.meets_difficulty(difficulty) {
            if attempts % MINING_CHECK_INTERVAL == 0 {
                control.check()?;
            }
            attempts += 1;
            self.nonce = self.nonce.checked_add(1).ok_or(ChainError::NonceExhausted)?;
            self.hash = self.recompute_hash();
        }
        Ok(self.nonce)
    }
}

/// True when `hash` starts with `difficulty` consecutive `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

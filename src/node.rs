//! Shared, concurrency-safe ledger handle for collaborator layers
//!
//! Lock discipline:
//! - `append_gate` serializes appends, so at most one block is being mined
//!   and the tip it was built on cannot move underneath it.
//! - `ledger` is only read-locked to seal a record or answer queries, and
//!   write-locked for the final push. Mining runs on a blocking worker with
//!   no ledger lock held, so readers keep seeing the last committed chain
//!   and never an in-progress block.

use crate::blockchain::{Block, ChainStats, Ledger, OpenedRecord, ValidationFailure};
use crate::config::Config;
use crate::crypto::{CryptoService, HashAlgorithm, SymmetricCiphertext};
use crate::error::{ChainError, CryptoError};
use crate::miner::{mine_block, MiningControl};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub struct LedgerNode {
    crypto: Arc<CryptoService>,
    ledger: Arc<RwLock<Ledger>>,
    append_gate: Mutex<()>,
    mining_timeout: Option<Duration>,
    is_mining: Arc<AtomicBool>,
    blocks_mined: Arc<AtomicU64>,
}

/// Clears the mining flag however the append ends, including a dropped future.
struct MiningFlag<'a>(&'a AtomicBool);

impl<'a> MiningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        MiningFlag(flag)
    }
}

impl Drop for MiningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl LedgerNode {
    /// Generates keys and mines genesis according to `config`.
    pub async fn init(config: &Config) -> Result<Self, ChainError> {
        config.validate()?;
        let bits = config.crypto.rsa_key_bits;
        let crypto = tokio::task::spawn_blocking(move || CryptoService::with_rsa_bits(bits))
            .await
            .map_err(|e| ChainError::WorkerError(e.to_string()))??;

        Self::with_crypto(
            Arc::new(crypto),
            config.ledger.difficulty,
            config.ledger.mining_timeout()?,
        )
        .await
    }

    /// Builds a node around an existing service; genesis is mined off the async runtime.
    pub async fn with_crypto(
        crypto: Arc<CryptoService>,
        difficulty: u32,
        mining_timeout: Option<Duration>,
    ) -> Result<Self, ChainError> {
        let service = crypto.clone();
        let control = control_for(mining_timeout);
        let ledger = tokio::task::spawn_blocking(move || {
            Ledger::with_control(service, difficulty, &control)
        })
        .await
        .map_err(|e| ChainError::WorkerError(e.to_string()))??;

        info!(difficulty, "ledger node ready");
        Ok(Self {
            crypto,
            ledger: Arc::new(RwLock::new(ledger)),
            append_gate: Mutex::new(()),
            mining_timeout,
            is_mining: Arc::new(AtomicBool::new(false)),
            blocks_mined: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn crypto(&self) -> &Arc<CryptoService> {
        &self.crypto
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    /// Blocks appended through this node since it started.
    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Ledger operations
    // ------------------------------------------------------------------

    /// Snapshot of every committed block.
    pub async fn get_chain(&self) -> Vec<Block> {
        self.ledger.read().await.blocks().to_vec()
    }

    pub async fn get_block(&self, index: u64) -> Option<Block> {
        self.ledger.read().await.block(index).cloned()
    }

    pub async fn get_chain_stats(&self) -> ChainStats {
        self.ledger.read().await.stats()
    }

    pub async fn is_chain_valid(&self) -> bool {
        self.ledger.read().await.validate()
    }

    pub async fn validation_report(&self) -> Result<(), ValidationFailure> {
        self.ledger.read().await.validation_report()
    }

    pub async fn open_block(&self, index: u64) -> Result<OpenedRecord, ChainError> {
        self.ledger.read().await.open_block(index)
    }

    /// Seals, mines and appends `record`. The configured mining timeout
    /// starts once this append reaches the front of the queue.
    pub async fn add_block(&self, record: &str) -> Result<Block, ChainError> {
        let timeout = self.mining_timeout;
        self.append(record, move || control_for(timeout)).await
    }

    /// Serializes `record` as JSON and appends it.
    pub async fn add_record<T: Serialize>(&self, record: &T) -> Result<Block, ChainError> {
        let record = serde_json::to_string(record)?;
        self.add_block(&record).await
    }

    /// Appends `record`, mining under `control`.
    ///
    /// A deadline on `control` is absolute, so time spent waiting behind
    /// other appends counts against it. Cancelling `control`, passing its
    /// deadline, or dropping the returned future stops the search and
    /// discards the candidate; the chain is left exactly as it was.
    pub async fn add_block_with_control(
        &self,
        record: &str,
        control: MiningControl,
    ) -> Result<Block, ChainError> {
        self.append(record, move || control).await
    }

    async fn append<F>(&self, record: &str, make_control: F) -> Result<Block, ChainError>
    where
        F: FnOnce() -> MiningControl,
    {
        let _gate = self.append_gate.lock().await;
        let control = make_control();

        let (candidate, difficulty) = {
            let ledger = self.ledger.read().await;
            (ledger.prepare_block(record)?, ledger.difficulty())
        };
        debug!(index = candidate.index, "candidate sealed");

        let mined = {
            let _flag = MiningFlag::raise(&self.is_mining);
            let cancel_guard = control.cancel_on_drop();
            let worker_control = control.clone();
            let mined = tokio::task::spawn_blocking(move || {
                mine_block(candidate, difficulty, &worker_control)
            })
            .await
            .map_err(|e| ChainError::WorkerError(e.to_string()))??;
            cancel_guard.disarm();
            mined
        };

        let block = self.ledger.write().await.commit(mined)?.clone();
        self.blocks_mined.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    // ------------------------------------------------------------------
    // Direct cryptographic operations
    // ------------------------------------------------------------------

    /// Unknown algorithm names fall back to SHA-256.
    pub fn hash_data(&self, text: &str, algorithm: &str) -> String {
        self.crypto.hash(text, HashAlgorithm::from_name(algorithm))
    }

    pub fn rsa_encrypt(&self, text: &str) -> Result<String, CryptoError> {
        self.crypto.asymmetric_encrypt(text)
    }

    pub fn rsa_decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        self.crypto.asymmetric_decrypt(ciphertext)
    }

    pub fn aes_encrypt(&self, text: &str) -> Result<SymmetricCiphertext, CryptoError> {
        self.crypto.symmetric_encrypt(text, None)
    }

    pub fn aes_decrypt(&self, ciphertext: &str, key: &str, iv: &str) -> Result<String, CryptoError> {
        self.crypto.symmetric_decrypt(ciphertext, key, iv)
    }

    pub fn sign_data(&self, text: &str) -> Result<String, CryptoError> {
        self.crypto.sign(text)
    }

    pub fn verify_signature(&self, text: &str, signature: &str) -> bool {
        self.crypto.verify(text, signature)
    }
}

fn control_for(timeout: Option<Duration>) -> MiningControl {
    match timeout {
        Some(timeout) => MiningControl::new().with_timeout(timeout),
        None => MiningControl::new(),
    }
}

//! Proof-of-work mining driver
//!
//! The nonce search itself lives on [`Block::mine`]; this module owns the
//! controls around it: a shared cancellation flag, an optional deadline and
//! a guard that cancels the search when the caller goes away.

use crate::blockchain::Block;
use crate::error::ChainError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Nonce attempts between two polls of the [`MiningControl`].
pub const MINING_CHECK_INTERVAL: u64 = 1024;

/// Cancellation token plus optional deadline for one mining run.
///
/// Clones share the same flag, so a clone handed to another thread or task
/// can stop a search running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too large to represent as an `Instant` leaves the search
    /// without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Once triggered the flag remains set.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ChainError> {
        if self.is_cancelled() {
            return Err(ChainError::MiningCancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ChainError::MiningDeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Returns a guard that cancels this control when dropped, unless disarmed.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            control: Some(self.clone()),
        }
    }
}

/// Cancels the wrapped [`MiningControl`] on drop. Used by async callers so a
/// dropped future stops the blocking search it started.
#[derive(Debug)]
pub struct CancelOnDrop {
    control: Option<MiningControl>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.control = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(control) = self.control.take() {
            control.cancel();
        }
    }
}

/// Mines `block` at `difficulty` and hands it back once its hash qualifies.
pub fn mine_block(mut block: Block, difficulty: u32, control: &MiningControl) -> Result<Block, ChainError> {
    let started = Instant::now();
    debug!(index = block.index, difficulty, "mining started");

    match block.mine(difficulty, control) {
        Ok(nonce) => {
            info!(
                index = block.index,
                nonce,
                hash = %block.hash,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "block mined"
            );
            Ok(block)
        }
        Err(err) => {
            warn!(
                index = block.index,
                attempts = block.nonce,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "mining stopped: {}",
                err
            );
            Err(err)
        }
    }
}

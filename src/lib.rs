//! VaultChain - A tamper-evident ledger of sealed records
//!
//! Every record appended to the ledger is sealed (RSA-OAEP encrypted,
//! secp256k1-signed and SHA-256 hashed), wrapped in a block that links to
//! its predecessor's hash, and mined until the block hash carries the
//! configured number of leading zero hex digits.
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, canonical hashing, the ledger and chain validation
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work driver with cancellation and deadlines
//!
//! ## Cryptography
//! - [`crypto`] - Hashing, RSA-OAEP, AES-CBC, ECDSA signing (secp256k1)
//!
//! ## Integration
//! - [`node`] - Async, lock-disciplined ledger handle for collaborator layers
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Integration
// ============================================================================
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

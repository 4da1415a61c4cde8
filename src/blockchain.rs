// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into block structure, chain management, validation and statistics.

pub mod core;
pub use core::*;

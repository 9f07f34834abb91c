//! Core block-template mining logic for solominer.
//!
//! This crate provides:
//! - Compact difficulty decoding and hash-vs-target comparison
//! - Payout address resolution
//! - Coinbase transaction building with BIP34 height and a random extra-nonce
//! - Block assembly from a node-supplied template
//! - A batched, interruptible nonce search
//!
//! Nothing here performs I/O; fetching templates and submitting blocks is
//! left to the caller.

pub mod address;
pub mod block;
pub mod coinbase;
pub mod difficulty;
pub mod merkle;
pub mod network;
pub mod search;

pub use address::{validate_address, AddressError, Payout, ValidatedAddress};
pub use block::{assemble_block, assemble_header, AssembleError, BlockTemplate, CandidateBlock};
pub use coinbase::{build_coinbase_transaction, coinbase_script, CoinbaseBuilder, CoinbaseError};
pub use difficulty::{compact_to_target, decode_target, meets_target, parse_bits, DifficultyError};
pub use merkle::{compute_merkle_root, transactions_merkle_root};
pub use network::{block_subsidy, parse_network};
pub use search::{search, HashCounter, SearchOutcome};

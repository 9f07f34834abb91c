//! Nonce search over a candidate header.
//!
//! The search runs in bounded batches. Each call tries at most `attempts`
//! nonces and then hands control back, which is where the caller polls its
//! refresh and report timers. A solution ends the batch immediately.
//!
//! The nonce is 32 bits and wraps silently. Running off the end of the nonce
//! space is not an error: the caller refreshes the template on a timer, which
//! brings a new coinbase (new extra-nonce, new merkle root) and with it a
//! fresh search space.

use bitcoin::block::Header;
use bitcoin::{BlockHash, Target};

use crate::difficulty::meets_target;

/// Count of hash attempts since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashCounter {
    hashes: u64,
}

impl HashCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, hashes: u64) {
        self.hashes = self.hashes.wrapping_add(hashes);
    }

    pub fn count(&self) -> u64 {
        self.hashes
    }

    /// Return the count and reset it to zero.
    pub fn take(&mut self) -> u64 {
        std::mem::take(&mut self.hashes)
    }
}

/// Result of one search batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The header's current nonce solves it; this is its hash.
    Solved(BlockHash),
    /// No solution in this batch; the header holds the next nonce to try.
    Exhausted { attempts: u32 },
}

/// Search up to `attempts` nonces, starting with the header's current one.
///
/// On [`SearchOutcome::Solved`] the header is left holding the winning nonce.
/// Every hash computed is recorded in `counter`.
pub fn search(header: &mut Header, target: &Target, attempts: u32, counter: &mut HashCounter) -> SearchOutcome {
    for tried in 0..attempts {
        let hash = header.block_hash();

        if meets_target(&hash, target) {
            counter.record(u64::from(tried) + 1);
            return SearchOutcome::Solved(hash);
        }

        header.nonce = header.nonce.wrapping_add(1);
    }

    counter.record(u64::from(attempts));
    SearchOutcome::Exhausted { attempts }
}

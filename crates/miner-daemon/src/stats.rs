//! Hash rate and session statistics.

use std::fmt;
use std::time::Duration;

/// Hashes per second over some measured interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HashRate(f64);

impl HashRate {
    /// Rate of `hashes` computed over `elapsed`. Zero when no time passed.
    pub fn over(hashes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            HashRate(hashes as f64 / secs)
        } else {
            HashRate(0.0)
        }
    }

    pub fn hashes_per_sec(&self) -> f64 {
        self.0
    }

    pub fn kilohashes_per_sec(&self) -> f64 {
        self.0 / 1_000.0
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self.0;
        if rate >= 1_000_000_000.0 {
            write!(f, "{:.2} GH/s", rate / 1_000_000_000.0)
        } else if rate >= 1_000_000.0 {
            write!(f, "{:.2} MH/s", rate / 1_000_000.0)
        } else if rate >= 1_000.0 {
            write!(f, "{:.2} KH/s", rate / 1_000.0)
        } else {
            write!(f, "{:.2} H/s", rate)
        }
    }
}

/// Session totals, kept for the shutdown summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningStats {
    /// Total hashes computed.
    pub total_hashes: u64,
    /// Templates fetched successfully.
    pub templates_fetched: u64,
    /// Template fetches that failed.
    pub fetch_failures: u64,
    /// Blocks the node accepted.
    pub blocks_accepted: u64,
    /// Blocks the node rejected or that failed to reach it.
    pub blocks_rejected: u64,
    /// Rate from the most recent report.
    pub last_rate: Option<HashRate>,
}

impl MiningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Average rate over a session of length `elapsed`.
    pub fn average_rate(&self, elapsed: Duration) -> HashRate {
        HashRate::over(self.total_hashes, elapsed)
    }

    pub fn blocks_found(&self) -> u64 {
        self.blocks_accepted + self.blocks_rejected
    }
}

//! Mining cycle controller.
//!
//! A single state machine drives the whole cycle: fetch a template, assemble
//! a candidate, search nonces in batches, submit a solution, and start over.
//! Between batches it polls two timers. The refresh timer abandons the search
//! and fetches a new template; the report timer logs the hash rate and resets
//! the counter without interrupting the search.
//!
//! Everything runs on one task. A refresh replaces the candidate header and
//! target together before the next hash attempt, so no locking is involved.

use std::time::Duration;

use bitcoin::{Network, Target};
use solominer_core::difficulty::{bits_to_difficulty, format_difficulty};
use solominer_core::{
    assemble_block, block_subsidy, search, AssembleError, BlockTemplate, CandidateBlock, CoinbaseBuilder, CoinbaseError,
    HashCounter, Payout, SearchOutcome,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::rpc::{NodeClient, RpcError};
use crate::stats::{HashRate, MiningStats};

/// Controller errors. All of them stop the miner.
#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("cannot obtain an initial block template: {0}")]
    NoInitialTemplate(#[source] RpcError),

    #[error("cannot build coinbase for height {height}: {source}")]
    Coinbase {
        height: u64,
        #[source]
        source: CoinbaseError,
    },

    #[error("cannot assemble block for height {height}: {source}")]
    Assemble {
        height: u64,
        #[source]
        source: AssembleError,
    },
}

/// Where the controller is in the mining cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Fetching,
    Assembling,
    Searching,
    Submitting,
}

/// Controller settings, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct MinerSettings {
    pub network: Network,
    pub payout: Payout,
    pub refresh_interval: Duration,
    pub report_interval: Duration,
    /// Nonces tried between timer polls.
    pub batch_size: u32,
}

/// Deadline used when a period runs past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A periodic deadline checked at poll points.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    period: Duration,
    next: Instant,
}

impl Schedule {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: deadline(now, period),
        }
    }

    /// Returns true once the deadline has passed, and starts the next period.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now >= self.next {
            self.next = deadline(now, self.period);
            true
        } else {
            false
        }
    }

    /// Start a full period from `now`.
    pub fn reset(&mut self, now: Instant) {
        self.next = deadline(now, self.period);
    }
}

fn deadline(now: Instant, period: Duration) -> Instant {
    now.checked_add(period)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// The candidate under search and the target it must meet.
#[derive(Debug)]
struct Work {
    candidate: CandidateBlock,
    target: Target,
}

/// Drives the mining cycle against a node.
pub struct Controller<N> {
    node: N,
    settings: MinerSettings,
    state: MinerState,
    template: Option<BlockTemplate>,
    work: Option<Work>,
    counter: HashCounter,
    refresh: Schedule,
    report: Schedule,
    report_window_start: Instant,
    started: Instant,
    stats: MiningStats,
}

impl<N: NodeClient> Controller<N> {
    pub fn new(node: N, settings: MinerSettings) -> Self {
        let now = Instant::now();
        Self {
            refresh: Schedule::new(settings.refresh_interval, now),
            report: Schedule::new(settings.report_interval, now),
            node,
            settings,
            state: MinerState::Idle,
            template: None,
            work: None,
            counter: HashCounter::new(),
            report_window_start: now,
            started: now,
            stats: MiningStats::new(),
        }
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn stats(&self) -> &MiningStats {
        &self.stats
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// The candidate currently being searched, if any.
    pub fn candidate(&self) -> Option<&CandidateBlock> {
        self.work.as_ref().map(|work| &work.candidate)
    }

    /// Run until `shutdown` is cancelled or a fatal error occurs.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), MinerError> {
        info!(
            network = %self.settings.network,
            payout = %self.settings.payout,
            refresh_secs = self.settings.refresh_interval.as_secs(),
            report_secs = self.settings.report_interval.as_secs(),
            batch_size = self.settings.batch_size,
            "miner starting"
        );

        let result = loop {
            // A solved block goes out even when shutdown is pending
            if self.state == MinerState::Submitting {
                self.submit().await;
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                stepped = self.step() => {
                    if let Err(e) = stepped {
                        break Err(e);
                    }
                }
            }

            // Let the signal handler and the runtime in between batches
            if self.state == MinerState::Searching {
                tokio::task::yield_now().await;
            }
        };

        self.log_summary();
        result
    }

    /// Perform one state transition.
    ///
    /// In [`MinerState::Searching`] one step is one batch of nonces, preceded
    /// by a check of both timers.
    pub async fn step(&mut self) -> Result<(), MinerError> {
        match self.state {
            MinerState::Idle => {
                self.state = MinerState::Fetching;
            }
            MinerState::Fetching => self.fetch().await?,
            MinerState::Assembling => self.assemble()?,
            MinerState::Searching => self.search_batch(),
            MinerState::Submitting => self.submit().await,
        }
        Ok(())
    }

    async fn fetch(&mut self) -> Result<(), MinerError> {
        match self.node.get_block_template().await {
            Ok(template) => {
                self.stats.templates_fetched += 1;

                let new_tip = self
                    .template
                    .as_ref()
                    .map_or(true, |prev| prev.previous_hash != template.previous_hash);
                if new_tip {
                    let difficulty = template
                        .target()
                        .map(|target| format_difficulty(bits_to_difficulty(&target)))
                        .unwrap_or_else(|_| "unknown".to_string());
                    info!(
                        height = template.height,
                        bits = %template.bits,
                        difficulty = %difficulty,
                        "new block template"
                    );
                } else {
                    debug!(height = template.height, "template refreshed");
                }

                let subsidy = block_subsidy(self.settings.network, template.height);
                if !template.allows_reward(subsidy) {
                    warn!(
                        height = template.height,
                        %subsidy,
                        coinbase_value = template.coinbase_value,
                        "node allows less than the block subsidy; blocks may be rejected"
                    );
                }

                self.template = Some(template);
            }
            Err(e) => {
                self.stats.fetch_failures += 1;
                if self.template.is_none() {
                    return Err(MinerError::NoInitialTemplate(e));
                }
                warn!(error = %e, "getblocktemplate failed, reusing previous template");
            }
        }

        self.state = MinerState::Assembling;
        Ok(())
    }

    fn assemble(&mut self) -> Result<(), MinerError> {
        let Some(template) = self.template.as_ref() else {
            self.state = MinerState::Fetching;
            return Ok(());
        };
        let height = template.height;

        let builder = CoinbaseBuilder::new(self.settings.network, height, self.settings.payout.clone());
        let extra_nonce = builder.extra_nonce();
        let coinbase = builder
            .build()
            .map_err(|source| MinerError::Coinbase { height, source })?;

        let assemble_err = |source: AssembleError| MinerError::Assemble { height, source };
        let candidate = assemble_block(template, coinbase).map_err(assemble_err)?;
        let target = template.target().map_err(|e| assemble_err(e.into()))?;

        debug!(
            height,
            extra_nonce,
            merkle_root = %candidate.header.merkle_root,
            start_nonce = candidate.header.nonce,
            "candidate assembled"
        );

        // Replace header and target together; the old search is discarded
        self.work = Some(Work { candidate, target });
        self.refresh.reset(Instant::now());
        self.state = MinerState::Searching;
        Ok(())
    }

    fn search_batch(&mut self) {
        let now = Instant::now();
        if self.report.poll(now) {
            self.report_hash_rate(now);
        }
        if self.refresh.poll(now) {
            debug!("refresh interval elapsed, abandoning search");
            self.state = MinerState::Fetching;
            return;
        }

        let Some(work) = self.work.as_mut() else {
            self.state = MinerState::Fetching;
            return;
        };

        let before = self.counter.count();
        let outcome = search(
            &mut work.candidate.header,
            &work.target,
            self.settings.batch_size,
            &mut self.counter,
        );
        self.stats.total_hashes += self.counter.count().wrapping_sub(before);

        if let SearchOutcome::Solved(hash) = outcome {
            info!(
                height = work.candidate.height,
                nonce = work.candidate.header.nonce,
                %hash,
                "found block solution"
            );
            self.state = MinerState::Submitting;
        }
    }

    async fn submit(&mut self) {
        if let Some(work) = self.work.take() {
            let hash = work.candidate.block_hash();
            match self.node.submit_block(&work.candidate).await {
                Ok(()) => {
                    self.stats.blocks_accepted += 1;
                    info!("Block submitted! Hash:[{}]", hash);
                }
                Err(e) => {
                    self.stats.blocks_rejected += 1;
                    error!(%hash, height = work.candidate.height, error = %e, "submitblock failed");
                }
            }
        }

        // A solved block is never retried; a fresh template supersedes it
        self.state = MinerState::Fetching;
    }

    fn report_hash_rate(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.report_window_start);
        let rate = HashRate::over(self.counter.take(), elapsed);
        info!("Hashing speed: {:6.0} kilohashes/s", rate.kilohashes_per_sec());

        self.stats.last_rate = Some(rate);
        self.report_window_start = now;
    }

    fn log_summary(&self) {
        let elapsed = self.started.elapsed();
        info!(
            elapsed_secs = elapsed.as_secs(),
            total_hashes = self.stats.total_hashes,
            average = %self.stats.average_rate(elapsed),
            templates = self.stats.templates_fetched,
            fetch_failures = self.stats.fetch_failures,
            blocks_accepted = self.stats.blocks_accepted,
            blocks_rejected = self.stats.blocks_rejected,
            "miner stopped"
        );
    }
}

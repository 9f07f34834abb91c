//! Process configuration.
//!
//! Everything is fixed at startup from the command line, with environment
//! variable fallbacks for the values that are awkward to pass as arguments.

use std::path::PathBuf;
use std::time::Duration;

use bitcoin::Network;
use clap::{ArgGroup, Parser};
use solominer_core::{parse_network, AddressError, Payout};

use crate::controller::MinerSettings;
use crate::rpc::RpcSettings;

/// Longest accepted refresh or report interval: one day.
const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Parser, Debug, Clone)]
#[command(name = "solominer", version)]
#[command(about = "Mine blocks from a full node's block templates")]
#[command(group(
    ArgGroup::new("payout")
        .required(true)
        .args(["payout_address", "anyone_can_spend"])
))]
pub struct Config {
    /// Node RPC endpoint
    #[arg(long, env = "SOLOMINER_RPC_URL", default_value = "https://127.0.0.1:8334")]
    pub rpc_url: String,

    /// RPC username
    #[arg(long, env = "SOLOMINER_RPC_USER", default_value = "rpc")]
    pub rpc_user: String,

    /// RPC password
    #[arg(long, env = "SOLOMINER_RPC_PASS", hide_env_values = true)]
    pub rpc_pass: String,

    /// PEM certificate bundle to trust for the node's TLS endpoint
    #[arg(long, env = "SOLOMINER_RPC_CERT")]
    pub rpc_cert: Option<PathBuf>,

    /// RPC request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub rpc_timeout_secs: u64,

    /// Network being mined (bitcoin, testnet, signet, regtest)
    #[arg(long, env = "SOLOMINER_NETWORK", default_value = "bitcoin", value_parser = parse_network_arg)]
    pub network: Network,

    /// Address that receives the block reward
    #[arg(long, env = "SOLOMINER_PAYOUT_ADDRESS")]
    pub payout_address: Option<String>,

    /// Pay the reward to an OP_TRUE output anyone can take (test networks only)
    #[arg(long)]
    pub anyone_can_spend: bool,

    /// Seconds between template refreshes
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS))]
    pub refresh_secs: u64,

    /// Seconds between hash rate reports
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS))]
    pub report_secs: u64,

    /// Nonces tried between timer checks
    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: u32,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "SOLOMINER_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn rpc_settings(&self) -> RpcSettings {
        RpcSettings {
            url: self.rpc_url.clone(),
            user: self.rpc_user.clone(),
            pass: self.rpc_pass.clone(),
            cert: self.rpc_cert.clone(),
            timeout: self.rpc_timeout(),
        }
    }

    /// Resolve the payout: the configured address, or anyone-can-spend when
    /// that was explicitly requested.
    pub fn payout(&self) -> Result<Payout, AddressError> {
        Payout::resolve(self.payout_address.as_deref(), self.network)
    }

    /// Controller settings derived from this configuration.
    pub fn miner_settings(&self, payout: Payout) -> MinerSettings {
        MinerSettings {
            network: self.network,
            payout,
            refresh_interval: self.refresh_interval(),
            report_interval: self.report_interval(),
            batch_size: self.batch_size,
        }
    }
}

fn parse_network_arg(name: &str) -> Result<Network, String> {
    parse_network(name).ok_or_else(|| format!("unknown network {name:?}"))
}

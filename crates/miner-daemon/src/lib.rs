//! solominer daemon: drives the mining cycle against a full node over RPC.
//!
//! The pure mining logic lives in `solominer-core`. This crate adds the node
//! client, configuration, statistics and the controller state machine.

pub mod config;
pub mod controller;
pub mod rpc;
pub mod stats;

pub use config::Config;
pub use controller::{Controller, MinerError, MinerSettings, MinerState, Schedule};
pub use rpc::{NodeClient, RpcClient, RpcError, RpcSettings};
pub use stats::{HashRate, MiningStats};

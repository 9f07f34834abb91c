//! Network constants and the block subsidy schedule.

use bitcoin::{Amount, Network};

/// Block version used when the template does not carry one (BIP9 top bits).
pub const BLOCK_VERSION: i32 = 0x20000000;

/// Maximum size of the coinbase unlocking script.
pub const MAX_COINBASE_SCRIPTSIG_SIZE: usize = 100;

/// Minimum size of the coinbase unlocking script.
pub const MIN_COINBASE_SCRIPTSIG_SIZE: usize = 2;

/// Identifying flag string appended to every coinbase script.
pub const COINBASE_FLAGS: &str = "/P2SH/solominer/";

/// Initial block subsidy: 50 coins in base units.
const INITIAL_SUBSIDY_SATS: u64 = 5_000_000_000;

/// Number of blocks between subsidy halvings for the given network.
pub fn halving_interval(network: Network) -> u64 {
    match network {
        Network::Regtest => 150,
        _ => 210_000,
    }
}

/// Calculate the block subsidy for a given height.
///
/// The subsidy halves every [`halving_interval`] blocks and reaches zero
/// after 64 halvings.
pub fn block_subsidy(network: Network, height: u64) -> Amount {
    let halvings = height / halving_interval(network);
    if halvings >= 64 {
        return Amount::ZERO;
    }
    Amount::from_sat(INITIAL_SUBSIDY_SATS >> halvings)
}

/// Parse a network name as accepted on the command line.
///
/// Accepts the `bitcoin` crate's names plus the common aliases `mainnet`
/// and `main`.
pub fn parse_network(name: &str) -> Option<Network> {
    match name.to_lowercase().as_str() {
        "mainnet" | "main" | "bitcoin" => Some(Network::Bitcoin),
        "testnet" | "test" => Some(Network::Testnet),
        "signet" => Some(Network::Signet),
        "regtest" => Some(Network::Regtest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_subsidy() {
        let network = Network::Bitcoin;

        // Genesis block: 50 coins
        assert_eq!(network_subsidy(network, 0), 5_000_000_000);

        // First halving
        assert_eq!(network_subsidy(network, 210_000), 2_500_000_000);
        assert_eq!(network_subsidy(network, 209_999), 5_000_000_000);

        // Fourth halving
        assert_eq!(network_subsidy(network, 840_000), 312_500_000);

        // Subsidy runs out after 64 halvings
        assert_eq!(network_subsidy(network, 210_000 * 64), 0);
    }

    #[test]
    fn test_regtest_halves_faster() {
        assert_eq!(network_subsidy(Network::Regtest, 149), 5_000_000_000);
        assert_eq!(network_subsidy(Network::Regtest, 150), 2_500_000_000);
        assert_eq!(network_subsidy(Network::Regtest, 300), 1_250_000_000);
    }

    #[test]
    fn test_parse_network() {
        assert_eq!(parse_network("mainnet"), Some(Network::Bitcoin));
        assert_eq!(parse_network("BITCOIN"), Some(Network::Bitcoin));
        assert_eq!(parse_network("regtest"), Some(Network::Regtest));
        assert_eq!(parse_network("signet"), Some(Network::Signet));
        assert_eq!(parse_network("invalid"), None);
    }

    fn network_subsidy(network: Network, height: u64) -> u64 {
        block_subsidy(network, height).to_sat()
    }
}

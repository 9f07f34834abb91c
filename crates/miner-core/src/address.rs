//! Payout address resolution and coinbase output scripts.
//!
//! The configured payout address is parsed with the `bitcoin` crate and
//! checked against the network being mined. Mining without an address is an
//! explicit mode ([`Payout::AnyoneCanSpend`]) that pays to a bare `OP_TRUE`
//! script: anybody who sees the block can take the reward. It exists for
//! regtest and other throwaway setups.

use std::str::FromStr;

use bitcoin::address::AddressType;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::script::Builder;
use bitcoin::{Address, Network, ScriptBuf};

/// Address resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid payout address {address:?}: {reason}")]
    Invalid { address: String, reason: String },

    #[error("payout address {address:?} is not valid for {expected}")]
    NetworkMismatch { address: String, expected: Network },
}

/// A validated payout address with its output script.
#[derive(Debug, Clone)]
pub struct ValidatedAddress {
    /// The type of address, when it is a standard one.
    pub address_type: Option<AddressType>,
    /// The network this address was validated for.
    pub network: Network,
    /// The script the coinbase output pays to.
    pub script_pubkey: ScriptBuf,
    /// The original address string.
    pub display: String,
}

/// Validate an address string for the given network.
pub fn validate_address(address: &str, network: Network) -> Result<ValidatedAddress, AddressError> {
    let trimmed = address.trim();

    let unchecked = Address::from_str(trimmed).map_err(|e| AddressError::Invalid {
        address: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    if !unchecked.is_valid_for_network(network) {
        return Err(AddressError::NetworkMismatch {
            address: trimmed.to_string(),
            expected: network,
        });
    }
    let checked = unchecked.assume_checked();

    Ok(ValidatedAddress {
        address_type: checked.address_type(),
        network,
        script_pubkey: checked.script_pubkey(),
        display: trimmed.to_string(),
    })
}

/// Where the coinbase reward goes.
#[derive(Debug, Clone)]
pub enum Payout {
    /// Pay to a validated address.
    Address(ValidatedAddress),
    /// Pay to `OP_TRUE`. Insecure; only for test networks.
    AnyoneCanSpend,
}

impl Payout {
    /// Resolve an optional address string into a payout.
    ///
    /// `None` selects [`Payout::AnyoneCanSpend`]; callers are expected to
    /// have made that an explicit choice.
    pub fn resolve(address: Option<&str>, network: Network) -> Result<Self, AddressError> {
        match address {
            Some(address) => validate_address(address, network).map(Payout::Address),
            None => Ok(Payout::AnyoneCanSpend),
        }
    }

    /// The output script for the coinbase transaction.
    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            Payout::Address(address) => address.script_pubkey.clone(),
            // OP_PUSHNUM_1 is OP_TRUE
            Payout::AnyoneCanSpend => Builder::new().push_opcode(OP_PUSHNUM_1).into_script(),
        }
    }

    /// Whether this payout can be redeemed by anyone.
    pub fn is_anyone_can_spend(&self) -> bool {
        matches!(self, Payout::AnyoneCanSpend)
    }
}

impl std::fmt::Display for Payout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payout::Address(address) => write!(f, "{}", address.display),
            Payout::AnyoneCanSpend => write!(f, "anyone-can-spend (OP_TRUE)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2pkh_mainnet() {
        let result = validate_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", Network::Bitcoin).unwrap();

        assert_eq!(result.address_type, Some(AddressType::P2pkh));
        assert_eq!(result.script_pubkey.len(), 25);
        assert_eq!(result.script_pubkey.as_bytes()[0], 0x76); // OP_DUP
        assert_eq!(result.script_pubkey.as_bytes()[1], 0xa9); // OP_HASH160
    }

    #[test]
    fn test_p2wpkh_mainnet() {
        let result =
            validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", Network::Bitcoin).unwrap();

        assert_eq!(result.address_type, Some(AddressType::P2wpkh));
        assert_eq!(result.script_pubkey.len(), 22);
        assert_eq!(result.script_pubkey.as_bytes()[0], 0x00); // OP_0
        assert_eq!(result.script_pubkey.as_bytes()[1], 0x14); // Push 20 bytes
    }

    #[test]
    fn test_testnet_address() {
        let address = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        let result = validate_address(address, Network::Testnet).unwrap();
        assert_eq!(result.address_type, Some(AddressType::P2wpkh));
        assert_eq!(result.network, Network::Testnet);

        // Signet shares the "tb" prefix, regtest uses "bcrt"
        assert!(validate_address(address, Network::Signet).is_ok());
        assert!(matches!(
            validate_address(address, Network::Regtest),
            Err(AddressError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn test_network_mismatch() {
        let result = validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", Network::Testnet);
        assert!(matches!(result, Err(AddressError::NetworkMismatch { .. })));
    }

    #[test]
    fn test_invalid_checksum() {
        // Last character changed
        let result = validate_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3", Network::Bitcoin);
        assert!(matches!(result, Err(AddressError::Invalid { .. })));
    }

    #[test]
    fn test_payout_resolution() {
        let payout = Payout::resolve(None, Network::Regtest).unwrap();
        assert!(payout.is_anyone_can_spend());
        assert_eq!(payout.script_pubkey().as_bytes(), &[0x51]);

        let payout =
            Payout::resolve(Some("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"), Network::Bitcoin).unwrap();
        assert!(!payout.is_anyone_can_spend());
        assert_eq!(payout.script_pubkey().len(), 22);

        assert!(Payout::resolve(Some("garbage"), Network::Bitcoin).is_err());
    }
}

//! Coinbase transaction construction.
//!
//! The coinbase transaction is the single reward-claiming transaction in a
//! template-mined block. Its unlocking script carries the block height, a
//! random extra-nonce and our flag string. The extra-nonce is what keeps two
//! coinbases for the same height and payout from sharing a txid.

use bitcoin::absolute::LockTime;
use bitcoin::script::{Builder, PushBytes, PushBytesError};
use bitcoin::transaction::Version;
use bitcoin::{Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::address::Payout;
use crate::network::{block_subsidy, COINBASE_FLAGS, MAX_COINBASE_SCRIPTSIG_SIZE, MIN_COINBASE_SCRIPTSIG_SIZE};

/// Coinbase construction errors.
#[derive(Debug, thiserror::Error)]
pub enum CoinbaseError {
    #[error("block height {0} does not fit in a script number")]
    HeightOutOfRange(u64),

    #[error("failed to push coinbase script data: {0}")]
    Push(#[from] PushBytesError),

    #[error("coinbase script is {0} bytes, outside the allowed 2..=100")]
    ScriptSize(usize),
}

/// Build the coinbase unlocking script for a height and extra-nonce.
///
/// Layout: `<height> <extra_nonce: 8 bytes LE> <flags>`. The height is a
/// minimally encoded script number as BIP34 requires.
pub fn coinbase_script(height: u64, extra_nonce: u64) -> Result<ScriptBuf, CoinbaseError> {
    let script_height = i64::try_from(height).map_err(|_| CoinbaseError::HeightOutOfRange(height))?;
    let extra_nonce = extra_nonce.to_le_bytes();

    let script = Builder::new()
        .push_int(script_height)
        .push_slice(<&PushBytes>::try_from(&extra_nonce[..])?)
        .push_slice(<&PushBytes>::try_from(COINBASE_FLAGS.as_bytes())?)
        .into_script();

    if !(MIN_COINBASE_SCRIPTSIG_SIZE..=MAX_COINBASE_SCRIPTSIG_SIZE).contains(&script.len()) {
        return Err(CoinbaseError::ScriptSize(script.len()));
    }

    Ok(script)
}

/// Builder for constructing coinbase transactions.
#[derive(Debug, Clone)]
pub struct CoinbaseBuilder {
    /// The network, which decides the subsidy schedule.
    network: Network,
    /// Height of the block being mined.
    height: u64,
    /// Where the reward goes.
    payout: Payout,
    /// Uniqueness nonce for the unlocking script.
    extra_nonce: u64,
}

impl CoinbaseBuilder {
    /// Create a new coinbase builder with a freshly drawn extra-nonce.
    pub fn new(network: Network, height: u64, payout: Payout) -> Self {
        CoinbaseBuilder {
            network,
            height,
            payout,
            extra_nonce: rand::random(),
        }
    }

    /// Set the extra-nonce explicitly.
    pub fn with_extra_nonce(mut self, extra_nonce: u64) -> Self {
        self.extra_nonce = extra_nonce;
        self
    }

    pub fn extra_nonce(&self) -> u64 {
        self.extra_nonce
    }

    /// Build the coinbase transaction.
    ///
    /// One input spending the null outpoint (zero txid, maximal index) and
    /// one output paying the height's subsidy to the payout script.
    pub fn build(&self) -> Result<Transaction, CoinbaseError> {
        let script_sig = coinbase_script(self.height, self.extra_nonce)?;

        Ok(Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: block_subsidy(self.network, self.height),
                script_pubkey: self.payout.script_pubkey(),
            }],
        })
    }
}

/// Build a coinbase transaction with a random extra-nonce.
pub fn build_coinbase_transaction(
    network: Network,
    height: u64,
    payout: &Payout,
) -> Result<Transaction, CoinbaseError> {
    CoinbaseBuilder::new(network, height, payout.clone()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::validate_address;

    #[test]
    fn test_coinbase_script_layout() {
        let script = coinbase_script(875_000, 0x0807060504030201).unwrap();
        let bytes = script.as_bytes();

        // 875000 = 0x0D59F8, pushed as 3 little-endian bytes
        assert_eq!(&bytes[..4], &[0x03, 0xf8, 0x59, 0x0d]);

        // Extra nonce: push 8 bytes, little-endian
        assert_eq!(bytes[4], 0x08);
        assert_eq!(&bytes[5..13], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);

        // Flags
        assert_eq!(bytes[13] as usize, COINBASE_FLAGS.len());
        assert_eq!(&bytes[14..], COINBASE_FLAGS.as_bytes());
    }

    #[test]
    fn test_small_heights_use_opcodes() {
        // Heights 1..=16 are a single OP_N
        let script = coinbase_script(1, 0).unwrap();
        assert_eq!(script.as_bytes()[0], 0x51);
        assert_eq!(script.len(), 1 + 9 + 1 + COINBASE_FLAGS.len());
    }

    #[test]
    fn test_coinbase_script_differs_per_extra_nonce() {
        for height in [1u64, 16, 17, 210_000, 875_000] {
            let a = coinbase_script(height, 1).unwrap();
            let b = coinbase_script(height, 2).unwrap();
            assert_ne!(a, b, "height {}", height);
        }
    }

    #[test]
    fn test_height_out_of_range() {
        assert!(matches!(
            coinbase_script(u64::MAX, 0),
            Err(CoinbaseError::HeightOutOfRange(u64::MAX))
        ));
    }

    #[test]
    fn test_coinbase_builder() {
        let network = Network::Bitcoin;
        let address = validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", network).unwrap();
        let expected_script = address.script_pubkey.clone();

        let tx = CoinbaseBuilder::new(network, 875_000, Payout::Address(address))
            .with_extra_nonce(42)
            .build()
            .unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].previous_output, OutPoint::null());
        assert_eq!(tx.input[0].sequence, Sequence::MAX);
        assert_eq!(tx.input[0].script_sig, coinbase_script(875_000, 42).unwrap());

        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value.to_sat(), 312_500_000);
        assert_eq!(tx.output[0].script_pubkey, expected_script);
    }

    #[test]
    fn test_anyone_can_spend_output() {
        let tx = CoinbaseBuilder::new(Network::Regtest, 101, Payout::AnyoneCanSpend)
            .build()
            .unwrap();

        assert_eq!(tx.output[0].script_pubkey.as_bytes(), &[0x51]);
        assert_eq!(tx.output[0].value.to_sat(), 5_000_000_000);
    }

    #[test]
    fn test_random_extra_nonce_makes_txids_unique() {
        let payout = Payout::AnyoneCanSpend;
        let a = build_coinbase_transaction(Network::Regtest, 500, &payout).unwrap();
        let b = build_coinbase_transaction(Network::Regtest, 500, &payout).unwrap();

        assert_ne!(a.input[0].script_sig, b.input[0].script_sig);
        assert_ne!(a.compute_txid(), b.compute_txid());
    }
}

//! Block templates and candidate block assembly.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::block::{Header, Version};
use bitcoin::consensus::encode::serialize;
use bitcoin::{Amount, Block, BlockHash, CompactTarget, Target, Transaction};
use serde::Deserialize;

use crate::difficulty::{compact_to_target, parse_bits, DifficultyError};
use crate::merkle::transactions_merkle_root;
use crate::network::BLOCK_VERSION;

/// Block assembly errors.
///
/// Every variant means the template cannot be mined as given.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("malformed previous block hash {hash:?}: {reason}")]
    PreviousHash { hash: String, reason: String },

    #[error(transparent)]
    Difficulty(#[from] DifficultyError),

    #[error("cannot compute a merkle root over an empty transaction set")]
    EmptyTransactionSet,
}

/// The node's description of the next block to mine.
///
/// Deserialized from a `getblocktemplate` result. Only the fields the miner
/// uses are kept; a new template always replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockTemplate {
    /// Height of the block being mined.
    pub height: u64,
    /// Hash of the current tip, in display (reversed hex) order.
    #[serde(rename = "previousblockhash")]
    pub previous_hash: String,
    /// Compact difficulty target as a hex string.
    pub bits: String,
    /// Block version to use.
    #[serde(default)]
    pub version: Option<i32>,
    /// The node's current time.
    #[serde(rename = "curtime", default)]
    pub cur_time: Option<u32>,
    /// Earliest acceptable block time.
    #[serde(rename = "mintime", default)]
    pub min_time: Option<u32>,
    /// Total value the coinbase may claim (subsidy plus fees).
    #[serde(rename = "coinbasevalue", default)]
    pub coinbase_value: Option<u64>,
}

impl BlockTemplate {
    /// Parse the previous block hash.
    pub fn previous_block_hash(&self) -> Result<BlockHash, AssembleError> {
        BlockHash::from_str(&self.previous_hash).map_err(|e| AssembleError::PreviousHash {
            hash: self.previous_hash.clone(),
            reason: e.to_string(),
        })
    }

    /// Parse the compact difficulty bits.
    pub fn compact_bits(&self) -> Result<CompactTarget, DifficultyError> {
        parse_bits(&self.bits)
    }

    /// Decode the full difficulty target.
    pub fn target(&self) -> Result<Target, DifficultyError> {
        compact_to_target(self.compact_bits()?)
    }

    /// Block timestamp: the node's current time, or ours if it sent none.
    ///
    /// Never earlier than the template's minimum time.
    pub fn timestamp(&self) -> u32 {
        let time = self.cur_time.unwrap_or_else(current_timestamp);
        time.max(self.min_time.unwrap_or(0))
    }

    pub fn block_version(&self) -> Version {
        Version::from_consensus(self.version.unwrap_or(BLOCK_VERSION))
    }

    /// Whether a coinbase paying `reward` stays within what the node allows.
    ///
    /// True when the template does not state a coinbase value.
    pub fn allows_reward(&self, reward: Amount) -> bool {
        self.coinbase_value
            .map_or(true, |value| reward <= Amount::from_sat(value))
    }
}

/// A block ready for nonce search: header plus its coinbase transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBlock {
    /// The header being searched.
    pub header: Header,
    /// The coinbase transaction the merkle root commits to.
    pub coinbase: Transaction,
    /// The height of the block.
    pub height: u64,
}

impl CandidateBlock {
    /// The current header hash.
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// The full block for submission.
    pub fn to_block(&self) -> Block {
        Block {
            header: self.header,
            txdata: vec![self.coinbase.clone()],
        }
    }

    /// Serialize the complete block for submission.
    pub fn serialize_block(&self) -> Vec<u8> {
        serialize(&self.to_block())
    }

    /// Get the block as hex string for submission.
    pub fn serialize_block_hex(&self) -> String {
        hex::encode(self.serialize_block())
    }
}

/// Assemble a mineable header from a template and its coinbase transaction.
///
/// The merkle root covers the coinbase alone. The nonce starts at a random
/// value so that two miners on the same template do not walk the same
/// nonces. Everything except the nonce is a function of the inputs.
pub fn assemble_header(template: &BlockTemplate, coinbase: &Transaction) -> Result<Header, AssembleError> {
    let merkle_root =
        transactions_merkle_root(std::slice::from_ref(coinbase)).ok_or(AssembleError::EmptyTransactionSet)?;

    Ok(Header {
        version: template.block_version(),
        prev_blockhash: template.previous_block_hash()?,
        merkle_root,
        time: template.timestamp(),
        bits: template.compact_bits()?,
        nonce: rand::random(),
    })
}

/// Assemble a candidate block, taking ownership of the coinbase.
pub fn assemble_block(template: &BlockTemplate, coinbase: Transaction) -> Result<CandidateBlock, AssembleError> {
    let header = assemble_header(template, &coinbase)?;
    Ok(CandidateBlock {
        header,
        coinbase,
        height: template.height,
    })
}

/// Get the current Unix timestamp.
fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Payout;
    use crate::coinbase::CoinbaseBuilder;
    use bitcoin::consensus::encode::deserialize;
    use bitcoin::Network;

    const PREV_HASH: &str = "000000000000000000026a5b9c1f1f8b6b1c7f4a4d9e6f1a3c2b0e9d8c7b6a59";

    fn template() -> BlockTemplate {
        BlockTemplate {
            height: 875_000,
            previous_hash: PREV_HASH.to_string(),
            bits: "17034219".to_string(),
            version: Some(0x20000004),
            cur_time: Some(1_700_000_000),
            min_time: Some(1_699_999_000),
            coinbase_value: None,
        }
    }

    fn coinbase(extra_nonce: u64) -> Transaction {
        CoinbaseBuilder::new(Network::Bitcoin, 875_000, Payout::AnyoneCanSpend)
            .with_extra_nonce(extra_nonce)
            .build()
            .unwrap()
    }

    #[test]
    fn test_template_from_rpc_json() {
        let json = serde_json::json!({
            "version": 536870912,
            "previousblockhash": PREV_HASH,
            "transactions": [],
            "coinbasevalue": 312500000,
            "target": "0000000000000000000342190000000000000000000000000000000000000000",
            "mintime": 1699999000,
            "curtime": 1700000000,
            "bits": "17034219",
            "height": 875000
        });

        let template: BlockTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(template.height, 875_000);
        assert_eq!(template.previous_hash, PREV_HASH);
        assert_eq!(template.bits, "17034219");
        assert_eq!(template.version, Some(0x20000000));
        assert_eq!(template.cur_time, Some(1_700_000_000));
        assert_eq!(template.coinbase_value, Some(312_500_000));
    }

    #[test]
    fn test_template_defaults() {
        let json = serde_json::json!({
            "previousblockhash": PREV_HASH,
            "bits": "207fffff",
            "height": 1
        });

        let template: BlockTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(template.block_version().to_consensus(), BLOCK_VERSION);
        assert!(template.timestamp() > 1_600_000_000);
    }

    #[test]
    fn test_timestamp_respects_min_time() {
        let mut t = template();
        t.cur_time = Some(100);
        t.min_time = Some(200);
        assert_eq!(t.timestamp(), 200);
    }

    #[test]
    fn test_reward_within_coinbase_value() {
        let mut t = template();
        assert!(t.allows_reward(Amount::from_sat(u64::MAX)));

        // Subsidy plus fees covers the subsidy alone
        t.coinbase_value = Some(312_600_000);
        assert!(t.allows_reward(Amount::from_sat(312_500_000)));
        assert!(t.allows_reward(Amount::from_sat(312_600_000)));
        assert!(!t.allows_reward(Amount::from_sat(625_000_000)));
    }

    #[test]
    fn test_assemble_header_fields() {
        let t = template();
        let cb = coinbase(7);
        let header = assemble_header(&t, &cb).unwrap();

        assert_eq!(header.prev_blockhash.to_string(), PREV_HASH);
        assert_eq!(header.bits.to_consensus(), 0x17034219);
        assert_eq!(header.version.to_consensus(), 0x20000004);
        assert_eq!(header.time, 1_700_000_000);
        // Coinbase-only block: the merkle root is the coinbase txid
        assert_eq!(header.merkle_root.to_raw_hash(), cb.compute_txid().to_raw_hash());
    }

    #[test]
    fn test_assemble_header_is_deterministic_except_nonce() {
        let t = template();
        let cb = coinbase(7);

        let a = assemble_header(&t, &cb).unwrap();
        let b = assemble_header(&t, &cb).unwrap();

        assert_eq!(a.merkle_root, b.merkle_root);
        assert_eq!(a.prev_blockhash, b.prev_blockhash);
        assert_eq!(a.bits, b.bits);
        assert_eq!(a.time, b.time);
        assert_eq!(a.version, b.version);
    }

    #[test]
    fn test_different_coinbase_changes_merkle_root() {
        let t = template();
        let a = assemble_header(&t, &coinbase(1)).unwrap();
        let b = assemble_header(&t, &coinbase(2)).unwrap();
        assert_ne!(a.merkle_root, b.merkle_root);
    }

    #[test]
    fn test_malformed_previous_hash() {
        let mut t = template();
        t.previous_hash = "not-a-hash".to_string();
        assert!(matches!(
            assemble_header(&t, &coinbase(1)),
            Err(AssembleError::PreviousHash { .. })
        ));

        // Right characters, wrong length
        t.previous_hash = "00ff".to_string();
        assert!(matches!(
            assemble_header(&t, &coinbase(1)),
            Err(AssembleError::PreviousHash { .. })
        ));
    }

    #[test]
    fn test_malformed_bits() {
        let mut t = template();
        t.bits = "xyz".to_string();
        assert!(matches!(
            assemble_header(&t, &coinbase(1)),
            Err(AssembleError::Difficulty(DifficultyError::InvalidBits { .. }))
        ));
    }

    #[test]
    fn test_candidate_block_serialization() {
        let candidate = assemble_block(&template(), coinbase(9)).unwrap();
        assert_eq!(candidate.height, 875_000);

        let bytes = candidate.serialize_block();
        let block: Block = deserialize(&bytes).unwrap();
        assert_eq!(block.header, candidate.header);
        assert_eq!(block.txdata.len(), 1);
        assert_eq!(block.block_hash(), candidate.block_hash());

        assert_eq!(candidate.serialize_block_hex(), hex::encode(&bytes));
    }
}

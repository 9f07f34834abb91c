//! Merkle root computation over a block's transactions.

use bitcoin::{merkle_tree, Transaction, TxMerkleNode, Txid};

/// Compute the merkle root from a list of transaction IDs.
///
/// For a single transaction (our coinbase-only block) the root is the txid
/// itself. Returns `None` for an empty list.
pub fn compute_merkle_root(txids: &[Txid]) -> Option<TxMerkleNode> {
    merkle_tree::calculate_root(txids.iter().map(|txid| txid.to_raw_hash()))
        .map(TxMerkleNode::from_raw_hash)
}

/// Compute the merkle root of a transaction set.
pub fn transactions_merkle_root(txs: &[Transaction]) -> Option<TxMerkleNode> {
    let txids: Vec<Txid> = txs.iter().map(Transaction::compute_txid).collect();
    compute_merkle_root(&txids)
}

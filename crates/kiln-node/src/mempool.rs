use std::collections::HashMap;

use kiln_core::block::{Block, SignedTx};
use kiln_core::types::Account;
use kiln_crypto::hash::tx_hash;

/// Pending and archived transaction sets, keyed by lowercase tx-hash hex.
/// The two maps are disjoint: every transaction this node has ever accepted
/// is in exactly one of them.
#[derive(Default)]
pub struct Mempool {
    pending: HashMap<String, SignedTx>,
    archived: HashMap<String, SignedTx>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction into the pending set. An idempotent no-op when
    /// the hash is already pending or archived; returns whether it was new.
    /// The caller is responsible for balance validation against committed
    /// state; the signature is checked later by the block validator.
    pub fn add_pending(&mut self, stx: SignedTx) -> bool {
        let key = tx_hash(&stx.tx).to_hex();
        if self.pending.contains_key(&key) || self.archived.contains_key(&key) {
            return false;
        }
        self.pending.insert(key, stx);
        true
    }

    /// Move every transaction mined into `block` from pending to archived.
    /// Transactions first seen in the block (mined elsewhere) are archived
    /// too, so a later gossip of the same tx is dropped as a duplicate.
    pub fn remove_mined_by_block(&mut self, block: &Block) {
        for stx in &block.payload {
            let key = tx_hash(&stx.tx).to_hex();
            self.pending.remove(&key);
            self.archived.insert(key, stx.clone());
        }
    }

    pub fn pending_list(&self) -> Vec<SignedTx> {
        self.pending.values().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending non-reward transactions from `account`. Used to
    /// assign nonces to consecutive submissions between blocks.
    pub fn pending_from(&self, account: &Account) -> u64 {
        self.pending
            .values()
            .filter(|stx| !stx.tx.is_reward() && stx.tx.from == *account)
            .count() as u64
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_archived(&self, key: &str) -> bool {
        self.archived.contains_key(key)
    }
}

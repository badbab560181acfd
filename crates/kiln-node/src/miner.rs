use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kiln_core::block::{Block, SignedTx};
use kiln_core::error::KilnError;
use kiln_core::types::{Account, Hash};
use kiln_crypto::hash::block_hash;
use kiln_crypto::pow::is_valid_block_hash;

/// Everything a proof-of-work search needs, fixed up front. The header nonce
/// is the only field the search varies.
pub struct PendingBlock {
    pub parent: Hash,
    pub number: u64,
    pub time: u64,
    pub payload: Vec<SignedTx>,
    pub miner: Account,
}

impl PendingBlock {
    /// # Panics
    /// Panics on a zero miner address: there is no valid way to build a
    /// block without a reward recipient.
    pub fn new(parent: Hash, number: u64, payload: Vec<SignedTx>, miner: Account) -> Self {
        assert!(!miner.is_zero(), "pending block requires a non-zero miner account");
        Self {
            parent,
            number,
            time: Utc::now().timestamp() as u64,
            payload,
            miner,
        }
    }
}

/// Search for a header nonce satisfying the PoW predicate. Observes
/// `cancel` at the head of every attempt; a preempted search returns
/// `MiningCancelled` within one attempt. CPU-bound; callers on an async
/// runtime run this under `spawn_blocking`.
pub fn mine(cancel: &CancellationToken, pending: &PendingBlock) -> Result<Block, KilnError> {
    if pending.payload.is_empty() {
        return Err(KilnError::EmptyPayload);
    }

    let started = Instant::now();
    let mut attempts: u64 = 0;
    let mut rng = rand::thread_rng();
    let mut candidate = Block::new(
        pending.parent,
        pending.number,
        0,
        pending.time,
        pending.payload.clone(),
        pending.miner,
    );

    loop {
        if cancel.is_cancelled() {
            info!(number = pending.number, attempts, "mining cancelled");
            return Err(KilnError::MiningCancelled);
        }

        attempts += 1;
        candidate.header.nonce = rng.gen();
        let hash = block_hash(&candidate);
        if is_valid_block_hash(&hash) {
            info!(
                number = candidate.header.number,
                hash = %hash,
                nonce = candidate.header.nonce,
                txs = candidate.payload.len(),
                attempts,
                elapsed = ?started.elapsed(),
                "mined new block"
            );
            return Ok(candidate);
        }

        if attempts % 1_000_000 == 0 {
            debug!(number = pending.number, attempts, "still mining");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_crypto::signer::KeyPair;

    fn pending_with_one_tx() -> PendingBlock {
        let kp = KeyPair::generate();
        let stx = kp.transfer(kp.address, "", 3, 1);
        PendingBlock::new(Hash::zero(), 1, vec![stx], kp.address)
    }

    #[test]
    fn mined_block_satisfies_the_predicate() {
        let pending = pending_with_one_tx();
        let block = mine(&CancellationToken::new(), &pending).unwrap();

        assert!(is_valid_block_hash(&block_hash(&block)));
        assert_eq!(block.header.number, 1);
        assert_eq!(block.header.parent_hash, Hash::zero());
        assert_eq!(block.payload, pending.payload);
        assert_eq!(block.header.miner, pending.miner);
    }

    #[test]
    fn empty_payload_is_rejected_immediately() {
        let kp = KeyPair::generate();
        let pending = PendingBlock::new(Hash::zero(), 1, Vec::new(), kp.address);
        assert!(matches!(
            mine(&CancellationToken::new(), &pending).unwrap_err(),
            KilnError::EmptyPayload
        ));
    }

    #[test]
    fn cancelled_token_stops_the_search() {
        let pending = pending_with_one_tx();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            mine(&cancel, &pending).unwrap_err(),
            KilnError::MiningCancelled
        ));
    }

    #[test]
    #[should_panic(expected = "non-zero miner")]
    fn zero_miner_is_a_programmer_error() {
        let _ = PendingBlock::new(Hash::zero(), 1, Vec::new(), Account::zero());
    }
}

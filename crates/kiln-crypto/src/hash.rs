use sha2::{Digest, Sha256};
use sha3::Keccak256;

use kiln_core::block::{Block, Tx};
use kiln_core::types::Hash;

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 of arbitrary bytes (address derivation).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Transaction identity: SHA-256 of the canonical JSON encoding.
pub fn tx_hash(tx: &Tx) -> Hash {
    Hash::from_bytes(sha256(&tx.encode()))
}

/// Block identity: SHA-256 of the canonical JSON encoding.
pub fn block_hash(block: &Block) -> Hash {
    Hash::from_bytes(sha256(&block.encode()))
}

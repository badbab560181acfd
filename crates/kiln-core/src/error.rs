use thiserror::Error;

use crate::types::{Account, Balance, Hash, Nonce};

#[derive(Debug, Error)]
pub enum KilnError {
    // ── Block validation ─────────────────────────────────────────────────────
    #[error("wrong block number: expected {expected}, got {got}")]
    BlockNumberMismatch { expected: u64, got: u64 },

    #[error("wrong parent hash: expected {expected}, got {got}")]
    ParentHashMismatch { expected: Hash, got: Hash },

    #[error("block hash {0} does not satisfy the proof-of-work target")]
    InvalidProofOfWork(Hash),

    // ── Transaction validation ───────────────────────────────────────────────
    #[error("forged transaction {tx_hash}: signature does not recover to the sender")]
    TxForged { tx_hash: Hash },

    #[error("insufficient funds: account {account} needs {need}, has {have}")]
    TxInsufficientFunds { account: Account, need: Balance, have: Balance },

    #[error("wrong nonce for account {account}: expected {expected}, got {got}")]
    TxNonceMismatch { account: Account, expected: Nonce, got: Nonce },

    // ── Mining ───────────────────────────────────────────────────────────────
    #[error("refusing to mine a block with an empty payload")]
    EmptyPayload,

    #[error("mining cancelled")]
    MiningCancelled,

    // ── Crypto / keystore ────────────────────────────────────────────────────
    #[error("crypto error: {0}")]
    Crypto(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    #[error("corrupt block record at line {line}: {reason}")]
    CorruptBlockRecord { line: usize, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! ─── Kiln protocol constants ─────────────────────────────────────────────────
//!
//! A permissioned educational ledger: flat fees, fixed block reward, pull
//! gossip. Everything here is a protocol-wide agreement between nodes.

use crate::types::Balance;

// ── Rewards and fees ─────────────────────────────────────────────────────────

/// Flat per-block reward credited to the miner on commit.
pub const REWARD: Balance = 175;

/// Flat per-transaction fee. Debited from the sender of every non-reward
/// transaction and credited to the block's miner.
pub const FEE: Balance = 50;

// ── Node cadence ─────────────────────────────────────────────────────────────

/// Peer reconciliation period.
pub const SYNC_INTERVAL_SECS: u64 = 10;

/// Mining tick period for ordinary nodes.
pub const MINE_INTERVAL_SECS: u64 = 20;

/// Mining tick period for bootstrap nodes. Longer on purpose, to bias
/// non-bootstrap nodes toward finding the next block first.
pub const BOOTSTRAP_MINE_INTERVAL_SECS: u64 = 60;

/// Per-call deadline for every outbound peer HTTP request, layered under the
/// caller's cancellation.
pub const PEER_REQUEST_TIMEOUT_SECS: u64 = 1;

// ── Genesis ──────────────────────────────────────────────────────────────────

/// Chain id written into a freshly initialized genesis file.
pub const DEFAULT_CHAIN_ID: &str = "kiln-ledger";

// ── Keystore ─────────────────────────────────────────────────────────────────

/// Minimum accepted passphrase length for encrypted key files.
pub const MIN_PASSPHRASE_LEN: usize = 6;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Account, Balance, Hash, Nonce, Signature};

/// Transaction `data` value that mints `value` to `to` instead of
/// transferring it. Anything else is an ordinary transfer.
pub const REWARD_DATA: &str = "reward";

// ── Tx ───────────────────────────────────────────────────────────────────────

/// A value transfer. The canonical encoding is the JSON serialization of
/// exactly these fields, in this declaration order; the transaction hash is
/// the SHA-256 of that encoding (see `kiln-crypto`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub from: Account,
    pub to: Account,
    pub value: Balance,
    pub data: String,
    pub nonce: Nonce,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Tx {
    /// Build a transaction stamped with the current RFC 3339 instant.
    pub fn new(from: Account, to: Account, data: impl Into<String>, value: Balance, nonce: Nonce) -> Self {
        Self {
            from,
            to,
            value,
            data: data.into(),
            nonce,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Canonical JSON encoding, the signing and hashing pre-image.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("tx serialization is infallible")
    }

    pub fn is_reward(&self) -> bool {
        self.data == REWARD_DATA
    }
}

// ── SignedTx ─────────────────────────────────────────────────────────────────

/// A transaction plus the 65-byte recoverable signature over its hash.
/// Authentic iff the recovered signer address equals `tx.from`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub tx: Tx,
    pub sig: Signature,
}

impl SignedTx {
    pub fn new(tx: Tx, sig: Signature) -> Self {
        Self { tx, sig }
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(rename = "parentHash")]
    pub parent_hash: Hash,
    pub number: u64,
    /// 32-bit field varied by the miner to satisfy the PoW predicate.
    pub nonce: u32,
    /// Unix seconds.
    pub time: u64,
    pub miner: Account,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<SignedTx>,
}

impl Block {
    pub fn new(
        parent_hash: Hash,
        number: u64,
        nonce: u32,
        time: u64,
        payload: Vec<SignedTx>,
        miner: Account,
    ) -> Self {
        Self {
            header: BlockHeader { parent_hash, number, nonce, time, miner },
            payload,
        }
    }

    /// Canonical JSON encoding, the hashing pre-image.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("block serialization is infallible")
    }
}

impl Default for Block {
    /// The pre-genesis cursor: number 0, zero parent, empty payload. Never
    /// persisted; only the in-memory "last block" before any real block lands.
    fn default() -> Self {
        Block::new(Hash::zero(), 0, 0, 0, Vec::new(), Account::zero())
    }
}

// ── BlockRecord ──────────────────────────────────────────────────────────────

/// On-disk line format: the block plus its hash, persisted redundantly so a
/// reader can index the log without rehashing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: Hash,
    pub block: Block,
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(b: u8) -> Account {
        Account::from_bytes([b; 20])
    }

    #[test]
    fn canonical_tx_field_order() {
        let mut tx = Tx::new(acc(1), acc(2), "", 42, 1);
        tx.created_at = "2025-05-08T16:02:02+03:00".to_string();
        let json = String::from_utf8(tx.encode()).unwrap();
        assert_eq!(
            json,
            format!(
                "{{\"from\":\"{}\",\"to\":\"{}\",\"value\":42,\"data\":\"\",\"nonce\":1,\"createdAt\":\"2025-05-08T16:02:02+03:00\"}}",
                acc(1).to_hex(),
                acc(2).to_hex(),
            )
        );
    }

    #[test]
    fn reward_is_the_only_recognized_data_value() {
        assert!(Tx::new(acc(1), acc(1), "reward", 1, 0).is_reward());
        assert!(!Tx::new(acc(1), acc(1), "Reward", 1, 0).is_reward());
        assert!(!Tx::new(acc(1), acc(1), "memo", 1, 0).is_reward());
    }

    #[test]
    fn signed_tx_json_flattens_tx_fields() {
        let tx = Tx::new(acc(3), acc(4), "", 7, 2);
        let stx = SignedTx::new(tx, Signature(vec![0xaa; 65]));
        let v: serde_json::Value = serde_json::from_slice(&serde_json::to_vec(&stx).unwrap()).unwrap();
        assert_eq!(v["value"], 7);
        assert_eq!(v["sig"].as_str().unwrap(), "aa".repeat(65));
    }

    #[test]
    fn block_record_round_trip() {
        let tx = Tx::new(acc(5), acc(6), "", 100, 1);
        let stx = SignedTx::new(tx, Signature(vec![1u8; 65]));
        let block = Block::new(Hash::from_bytes([7u8; 32]), 3, 0x0123, 1_746_709_322, vec![stx], acc(9));
        let record = BlockRecord { hash: Hash::from_bytes([8u8; 32]), block };

        let line = serde_json::to_string(&record).unwrap();
        let back: BlockRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
        // Re-encoding the decoded record reproduces the original line.
        assert_eq!(serde_json::to_string(&back).unwrap(), line);
    }
}

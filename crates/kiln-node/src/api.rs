//! Wire types for the REST surface and the peer client. Field names are part
//! of the gossip protocol; nodes of different builds must agree on them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use kiln_core::block::{Block, SignedTx};
use kiln_core::types::{Account, Balance, Hash};

use crate::peer::PeerNode;

/// `GET /node/status`: the peer reconciliation anchor with the chain head, known
/// peers, and the full pending set (gossip carries whole signed txs so the
/// receiver can re-validate them at its own commit point).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    pub block_hash: Hash,
    pub block_number: u64,
    /// Keyed by `"ip:port"`.
    pub known_peers: HashMap<String, PeerNode>,
    #[serde(rename = "pendingTXs")]
    pub pending_txs: Vec<SignedTx>,
}

/// `GET /balances/list`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalancesList {
    pub hash: Hash,
    pub balances: HashMap<Account, Balance>,
}

/// `GET /node/sync?fromBlock=<hex>`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncBlocks {
    pub blocks: Vec<Block>,
}

/// `GET /node/addpeer?ip=&port=`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddPeerResponse {
    pub success: bool,
    pub error: String,
}

/// `POST /tx/add` request body. Addresses arrive as strings so a malformed
/// one surfaces as a 400, not a deserialization failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxAddRequest {
    pub from: String,
    pub from_pwd: String,
    pub to: String,
    #[serde(default)]
    pub data: String,
    pub value: Balance,
}

/// `POST /tx/add` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxAddResponse {
    pub hash: Hash,
}

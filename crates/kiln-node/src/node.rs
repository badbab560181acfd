//! The node orchestrator: owns the chain state, the mempool, the peer set,
//! and the cancellation/signalling discipline that couples mining with peer
//! sync. All `add_block` calls funnel through the state mutex; the "new
//! synced block" channel is the only preemption path into the miner.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kiln_core::block::{Block, SignedTx, Tx};
use kiln_core::constants::{MINE_INTERVAL_SECS, SYNC_INTERVAL_SECS};
use kiln_core::error::KilnError;
use kiln_core::types::{Account, Balance, Hash};
use kiln_crypto::hash::tx_hash;
use kiln_crypto::signer::sign_tx_with_stored_key;
use kiln_state::State;

use crate::api::{BalancesList, NodeStatus};
use crate::mempool::Mempool;
use crate::miner::{self, PendingBlock};
use crate::peer::PeerNode;
use crate::sync;

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub datadir: PathBuf,
    /// Address this node is reachable at; peers learn it via `joinPeer`.
    pub ip: String,
    pub port: u16,
    /// Reward recipient for locally mined blocks.
    pub miner: Account,
    /// Directory of encrypted key files consumed by `POST /tx/add`.
    pub keystore_dir: PathBuf,
    pub bootstrap_peer: Option<(String, u16)>,
    pub is_bootstrap: bool,
    pub sync_interval: Duration,
    pub mine_interval: Duration,
}

impl NodeConfig {
    pub fn new(datadir: PathBuf, ip: impl Into<String>, port: u16, miner: Account) -> Self {
        let keystore_dir = datadir.join("keystore");
        Self {
            datadir,
            ip: ip.into(),
            port,
            miner,
            keystore_dir,
            bootstrap_peer: None,
            is_bootstrap: false,
            sync_interval: Duration::from_secs(SYNC_INTERVAL_SECS),
            mine_interval: Duration::from_secs(MINE_INTERVAL_SECS),
        }
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

pub struct Node {
    config: NodeConfig,
    state: AsyncMutex<State>,
    mempool: Mutex<Mempool>,
    peers: Mutex<HashMap<String, PeerNode>>,
    is_mining: AtomicBool,
    mining_cancel: Mutex<Option<CancellationToken>>,
    synced_tx: mpsc::Sender<Block>,
    // Handed to the mining supervisor by `run`.
    synced_rx: Mutex<Option<mpsc::Receiver<Block>>>,
}

impl Node {
    /// Open the chain state (initializing the datadir on first run) and wire
    /// the channels. Continuity checks are always on for a running node.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, KilnError> {
        let state = State::open(&config.datadir, true)?;

        let mut peers = HashMap::new();
        if let Some((ip, port)) = &config.bootstrap_peer {
            let peer = PeerNode::new(ip.clone(), *port, true);
            peers.insert(peer.tcp_addr(), peer);
        }

        // Capacity 1: the sync loop (sole sender) parks until the mining
        // supervisor has consumed the previous signal.
        let (synced_tx, synced_rx) = mpsc::channel(1);

        Ok(Arc::new(Self {
            config,
            state: AsyncMutex::new(state),
            mempool: Mutex::new(Mempool::new()),
            peers: Mutex::new(peers),
            is_mining: AtomicBool::new(false),
            mining_cancel: Mutex::new(None),
            synced_tx,
            synced_rx: Mutex::new(Some(synced_rx)),
        }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Start the sync loop and the mining supervisor, then return. Shutdown
    /// is driven entirely by `root`.
    pub fn run(self: &Arc<Self>, root: CancellationToken) {
        let synced_rx = self
            .synced_rx
            .lock()
            .unwrap()
            .take()
            .expect("run may only be called once");

        tokio::spawn(sync::run(Arc::clone(self), root.clone()));
        tokio::spawn(Arc::clone(self).mining_loop(root, synced_rx));
        info!(
            addr = %format!("{}:{}", self.config.ip, self.config.port),
            miner = %self.config.miner,
            bootstrap = self.config.is_bootstrap,
            "node loops started"
        );
    }

    /// Flush the ledger store.
    pub async fn close(&self) -> Result<(), KilnError> {
        self.state.lock().await.sync()
    }

    // ── Mining ───────────────────────────────────────────────────────────────

    async fn mining_loop(self: Arc<Self>, root: CancellationToken, mut synced_rx: mpsc::Receiver<Block>) {
        let mut ticker = tokio::time::interval(self.config.mine_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = root.cancelled() => {
                    debug!("mining supervisor stopped");
                    break;
                }
                _ = ticker.tick() => self.maybe_start_mining(&root),
                Some(block) = synced_rx.recv() => self.handle_synced_block(&block),
            }
        }
    }

    fn maybe_start_mining(self: &Arc<Self>, root: &CancellationToken) {
        if self.is_mining.load(Ordering::SeqCst) {
            return;
        }
        let payload = self.mempool.lock().unwrap().pending_list();
        if payload.is_empty() {
            return;
        }

        let cancel = root.child_token();
        *self.mining_cancel.lock().unwrap() = Some(cancel.clone());
        self.is_mining.store(true, Ordering::SeqCst);

        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.mine_and_commit(cancel, payload).await;
            *node.mining_cancel.lock().unwrap() = None;
            node.is_mining.store(false, Ordering::SeqCst);
        });
    }

    async fn mine_and_commit(&self, cancel: CancellationToken, payload: Vec<SignedTx>) {
        let (parent, number) = {
            let state = self.state.lock().await;
            (state.last_hash(), state.next_block_number())
        };
        let txs = payload.len();
        debug!(number, txs, "mining tick: starting proof-of-work");

        let pending = PendingBlock::new(parent, number, payload, self.config.miner);
        let mined = tokio::task::spawn_blocking(move || miner::mine(&cancel, &pending)).await;

        match mined {
            Ok(Ok(block)) => {
                let committed = { self.state.lock().await.add_block(&block) };
                match committed {
                    Ok(hash) => {
                        self.mempool.lock().unwrap().remove_mined_by_block(&block);
                        info!(number = block.header.number, %hash, "committed locally mined block");
                    }
                    // A synced block may have won the race after PoW
                    // finished; the payload stays pending for the next tick.
                    Err(e) => warn!(error = %e, "discarding mined block"),
                }
            }
            Ok(Err(KilnError::MiningCancelled)) => debug!("mining attempt discarded"),
            Ok(Err(e)) => warn!(error = %e, "mining failed"),
            Err(e) => warn!(error = %e, "mining task panicked"),
        }
    }

    // The only preemption path: trim the mempool first so the next attempt
    // does not re-mine transactions the chain already has, then cancel any
    // in-flight search.
    fn handle_synced_block(&self, block: &Block) {
        self.mempool.lock().unwrap().remove_mined_by_block(block);
        if self.is_mining.load(Ordering::SeqCst) {
            if let Some(cancel) = self.mining_cancel.lock().unwrap().as_ref() {
                info!(number = block.header.number, "synced block preempts in-flight mining");
                cancel.cancel();
            }
        }
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    /// Validate against committed balances and insert into the mempool.
    /// Duplicates (pending or already mined) are silently absorbed.
    pub async fn add_pending_tx(&self, stx: SignedTx) -> Result<Hash, KilnError> {
        let hash = tx_hash(&stx.tx);
        self.state.lock().await.is_valid_tx(&stx.tx)?;
        if self.mempool.lock().unwrap().add_pending(stx) {
            debug!(%hash, "transaction queued");
        }
        Ok(hash)
    }

    /// Build, sign (with the stored key), and queue a transfer. The nonce is
    /// the chain's next for `from`, advanced past its already-pending txs.
    pub async fn add_transaction(
        &self,
        from: Account,
        from_pwd: &str,
        to: Account,
        data: String,
        value: Balance,
    ) -> Result<Hash, KilnError> {
        let nonce = {
            let state = self.state.lock().await;
            state.next_account_nonce(&from) + self.mempool.lock().unwrap().pending_from(&from)
        };
        let tx = Tx::new(from, to, data, value, nonce);

        // scrypt key derivation is deliberately slow; keep it off the runtime.
        let keydir = self.config.keystore_dir.clone();
        let passphrase = from_pwd.to_string();
        let stx = tokio::task::spawn_blocking(move || {
            sign_tx_with_stored_key(tx, &from, &passphrase, &keydir)
        })
        .await
        .map_err(|e| KilnError::Crypto(format!("signing task failed: {e}")))??;

        self.add_pending_tx(stx).await
    }

    // ── Peer sync ────────────────────────────────────────────────────────────

    /// Apply a peer-supplied block and signal the mining supervisor. Called
    /// only from the sync loop, which serializes block application.
    pub async fn apply_synced_block(&self, block: Block) -> Result<Hash, KilnError> {
        let hash = { self.state.lock().await.add_block(&block)? };
        // Receiver gone only during shutdown.
        let _ = self.synced_tx.send(block).await;
        Ok(hash)
    }

    pub async fn chain_head(&self) -> (u64, Hash) {
        let state = self.state.lock().await;
        (state.last_block().header.number, state.last_hash())
    }

    // ── Peer set ─────────────────────────────────────────────────────────────

    pub fn is_known_peer(&self, peer: &PeerNode) -> bool {
        self.peers.lock().unwrap().contains_key(&peer.tcp_addr())
    }

    pub fn add_peer(&self, peer: PeerNode) {
        let mut peers = self.peers.lock().unwrap();
        let key = peer.tcp_addr();
        if !peers.contains_key(&key) {
            info!(peer = %key, "discovered new peer");
            peers.insert(key, peer);
        }
    }

    pub fn mark_peer_active(&self, tcp_addr: &str) {
        if let Some(peer) = self.peers.lock().unwrap().get_mut(tcp_addr) {
            peer.is_active = true;
        }
    }

    /// Value-copied so no lock is held across sync I/O.
    pub fn peers_snapshot(&self) -> Vec<PeerNode> {
        self.peers.lock().unwrap().values().cloned().collect()
    }

    // ── Views (consumed by the HTTP layer) ───────────────────────────────────

    pub async fn view_balances(&self) -> BalancesList {
        let state = self.state.lock().await;
        BalancesList {
            hash: state.last_hash(),
            balances: state.balances_snapshot(),
        }
    }

    pub async fn view_status(&self) -> NodeStatus {
        let (block_number, block_hash) = self.chain_head().await;
        NodeStatus {
            block_hash,
            block_number,
            known_peers: self.peers.lock().unwrap().clone(),
            pending_txs: self.mempool.lock().unwrap().pending_list(),
        }
    }

    pub async fn view_blocks_after(&self, after: Hash) -> Result<Vec<Block>, KilnError> {
        self.state.lock().await.blocks_after(&after)
    }

    // Test hooks: mempool membership by tx hash.
    pub fn tx_is_pending(&self, hash: &Hash) -> bool {
        self.mempool.lock().unwrap().is_pending(&hash.to_hex())
    }

    pub fn tx_is_archived(&self, hash: &Hash) -> bool {
        self.mempool.lock().unwrap().is_archived(&hash.to_hex())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

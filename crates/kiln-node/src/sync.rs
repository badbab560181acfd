//! Periodic peer reconciliation: status → join → blocks → peer discovery →
//! mempool gossip, sequentially per peer, one tick at a time. Every failure
//! is a peer error: logged, skipped, retried next tick.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::node::Node;
use crate::peer::{PeerClient, PeerNode};

pub async fn run(node: Arc<Node>, root: CancellationToken) {
    let client = PeerClient::new();
    let mut ticker = tokio::time::interval(node.config().sync_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = root.cancelled() => {
                debug!("sync loop stopped");
                break;
            }
            _ = ticker.tick() => {
                // Dropping the in-flight pass aborts its outbound requests,
                // so shutdown never waits on a slow peer.
                tokio::select! {
                    _ = root.cancelled() => {
                        debug!("sync loop stopped mid-pass");
                        break;
                    }
                    _ = sync_once(&node, &client) => {}
                }
            }
        }
    }
}

/// One full reconciliation pass over the current peer set. Peers are
/// value-copied out of the lock before any I/O.
pub async fn sync_once(node: &Arc<Node>, client: &PeerClient) {
    for peer in node.peers_snapshot() {
        if peer.ip == node.config().ip && peer.port == node.config().port {
            continue;
        }
        if let Err(e) = sync_with_peer(node, client, &peer).await {
            warn!(peer = %peer.tcp_addr(), error = %e, "peer sync failed");
        }
    }
}

async fn sync_with_peer(
    node: &Arc<Node>,
    client: &PeerClient,
    peer: &PeerNode,
) -> anyhow::Result<()> {
    let status = client.status(peer).await?;

    if !peer.is_active {
        match client.join(peer, &node.config().ip, node.config().port).await {
            Ok(resp) if resp.success => {
                node.mark_peer_active(&peer.tcp_addr());
                info!(peer = %peer.tcp_addr(), "joined peer");
            }
            Ok(resp) => warn!(peer = %peer.tcp_addr(), error = %resp.error, "join refused"),
            Err(e) => warn!(peer = %peer.tcp_addr(), error = %e, "join failed"),
        }
    }

    // ── Block sync ───────────────────────────────────────────────────────────
    let (local_number, local_hash) = node.chain_head().await;
    if status.block_number > local_number {
        debug!(
            peer = %peer.tcp_addr(),
            theirs = status.block_number,
            ours = local_number,
            "peer is ahead, pulling blocks"
        );
        let blocks = client.blocks_since(peer, &local_hash).await?;
        for block in blocks {
            let number = block.header.number;
            match node.apply_synced_block(block).await {
                Ok(hash) => info!(number, %hash, peer = %peer.tcp_addr(), "applied synced block"),
                Err(e) => {
                    warn!(number, error = %e, peer = %peer.tcp_addr(), "stopping block sync");
                    break;
                }
            }
        }
    }

    // ── Peer discovery ───────────────────────────────────────────────────────
    for discovered in status.known_peers.into_values() {
        if discovered.ip == node.config().ip && discovered.port == node.config().port {
            continue;
        }
        if !node.is_known_peer(&discovered) {
            node.add_peer(PeerNode {
                is_active: false,
                ..discovered
            });
        }
    }

    // ── Mempool gossip ───────────────────────────────────────────────────────
    for stx in status.pending_txs {
        if let Err(e) = node.add_pending_tx(stx).await {
            debug!(error = %e, "dropped gossiped transaction");
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use kiln_core::types::{Account, Balance, Hash};
    use kiln_crypto::hash::tx_hash;
    use kiln_crypto::signer::KeyPair;
    use kiln_state::{store, Genesis};

    use crate::http;
    use crate::node::NodeConfig;

    fn temp_datadir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln_sync_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn seed_genesis(datadir: &PathBuf, balances: &[(Account, Balance)]) {
        store::init_dir(datadir).unwrap();
        let mut genesis = Genesis::new();
        for (acc, bal) in balances {
            genesis.balances.insert(*acc, *bal);
        }
        genesis.save(&store::genesis_path(datadir)).unwrap();
    }

    /// Bind a server for `node` on an ephemeral port and fix the node's
    /// advertised port to match.
    async fn serve(config: NodeConfig, root: &CancellationToken) -> (Arc<Node>, u16) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = config;
        config.port = port;
        let node = Node::open(config).unwrap();

        let app = http::router(Arc::clone(&node));
        let shutdown = root.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });
        (node, port)
    }

    fn mined_externally(
        parent: Hash,
        number: u64,
        payload: Vec<kiln_core::block::SignedTx>,
        miner: Account,
    ) -> kiln_core::block::Block {
        let mut block = kiln_core::block::Block::new(parent, number, 0, 1_746_709_322, payload, miner);
        loop {
            if kiln_crypto::pow::is_valid_block_hash(&kiln_crypto::hash::block_hash(&block)) {
                return block;
            }
            block.header.nonce = block.header.nonce.wrapping_add(1);
        }
    }

    #[tokio::test]
    async fn one_pass_joins_syncs_blocks_and_gossips_txs() {
        let alice = KeyPair::generate();
        let miner = KeyPair::generate();
        let root = CancellationToken::new();

        // Node 1: one committed block and one pending transaction.
        let dir1 = temp_datadir("reconcile_n1");
        seed_genesis(&dir1, &[(alice.address, 10_000)]);
        let mut cfg1 = NodeConfig::new(dir1.clone(), "127.0.0.1", 0, miner.address);
        cfg1.sync_interval = Duration::from_secs(3600);
        let (n1, p1) = serve(cfg1, &root).await;

        let mined_tx = alice.transfer(alice.address, "", 100, 1);
        let mined_tx_hash = tx_hash(&mined_tx.tx);
        let block = mined_externally(Hash::zero(), 1, vec![mined_tx], miner.address);
        n1.apply_synced_block(block).await.unwrap();

        let gossiped = alice.transfer(alice.address, "", 200, 2);
        let gossiped_hash = tx_hash(&gossiped.tx);
        n1.add_pending_tx(gossiped).await.unwrap();

        // Node 2: fresh chain, knows node 1 as bootstrap.
        let dir2 = temp_datadir("reconcile_n2");
        seed_genesis(&dir2, &[(alice.address, 10_000)]);
        let mut cfg2 = NodeConfig::new(dir2.clone(), "127.0.0.1", 0, miner.address);
        cfg2.sync_interval = Duration::from_secs(3600);
        cfg2.bootstrap_peer = Some(("127.0.0.1".to_string(), p1));
        let (n2, p2) = serve(cfg2, &root).await;

        let client = PeerClient::new();
        sync_once(&n2, &client).await;

        // Block sync: node 2 caught up to node 1's head.
        assert_eq!(n2.chain_head().await, n1.chain_head().await);
        assert_eq!(n2.chain_head().await.0, 1);

        // Join: node 1 learned about node 2 (peer discovery, S6).
        let n2_as_peer = PeerNode::new("127.0.0.1", p2, false);
        assert!(n1.is_known_peer(&n2_as_peer));

        // The bootstrap peer is now marked active on node 2.
        let peer = n2
            .peers_snapshot()
            .into_iter()
            .find(|p| p.port == p1)
            .unwrap();
        assert!(peer.is_active);

        // Mempool gossip: the pending tx crossed over.
        assert!(n2.tx_is_pending(&gossiped_hash));
        // The mined tx was archived during block sync, never re-queued.
        assert!(!n2.tx_is_pending(&mined_tx_hash));
        assert!(n2.tx_is_archived(&mined_tx_hash));

        root.cancel();
        let _ = std::fs::remove_dir_all(&dir1);
        let _ = std::fs::remove_dir_all(&dir2);
    }

    #[tokio::test]
    async fn unreachable_peer_is_skipped_not_fatal() {
        let miner = KeyPair::generate();
        let dir = temp_datadir("unreachable");
        seed_genesis(&dir, &[]);

        let mut config = NodeConfig::new(dir.clone(), "127.0.0.1", 2, miner.address);
        // A port nobody listens on.
        config.bootstrap_peer = Some(("127.0.0.1".to_string(), 1));
        let node = Node::open(config).unwrap();

        // Must complete despite the dead peer.
        sync_once(&node, &PeerClient::new()).await;
        assert_eq!(node.chain_head().await.0, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use kiln_core::block::Block;
use kiln_core::constants::PEER_REQUEST_TIMEOUT_SECS;
use kiln_core::types::Hash;

use crate::api::{AddPeerResponse, NodeStatus, SyncBlocks};

// ── PeerNode ─────────────────────────────────────────────────────────────────

/// A known peer. `is_active` means a `joinPeer` handshake has succeeded (or
/// the peer called us); inactive peers are re-joined on each sync tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,
    pub is_active: bool,
}

impl PeerNode {
    pub fn new(ip: impl Into<String>, port: u16, is_bootstrap: bool) -> Self {
        Self {
            ip: ip.into(),
            port,
            is_bootstrap,
            is_active: false,
        }
    }

    /// The `"ip:port"` key used in peer maps and status payloads.
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

// ── PeerClient ───────────────────────────────────────────────────────────────

/// Typed HTTP calls to a peer. Every request carries the 1 s per-call
/// deadline; any transport failure, non-200 status, or decode failure is a
/// peer error; the sync loop logs it and moves on.
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(PEER_REQUEST_TIMEOUT_SECS))
            .build()
            .expect("building the peer HTTP client is infallible");
        Self { http }
    }

    pub async fn status(&self, peer: &PeerNode) -> anyhow::Result<NodeStatus> {
        let url = format!("{}/node/status", peer.base_url());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting status from {}", peer.tcp_addr()))?;
        if !resp.status().is_success() {
            bail!("peer {} returned {} for status", peer.tcp_addr(), resp.status());
        }
        resp.json().await.context("decoding peer status")
    }

    /// Fetch the blocks strictly after `from` (the zero hash asks for the
    /// peer's whole chain).
    pub async fn blocks_since(&self, peer: &PeerNode, from: &Hash) -> anyhow::Result<Vec<Block>> {
        let url = format!("{}/node/sync?fromBlock={}", peer.base_url(), from.to_hex());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting blocks from {}", peer.tcp_addr()))?;
        if !resp.status().is_success() {
            bail!("peer {} returned {} for sync", peer.tcp_addr(), resp.status());
        }
        let body: SyncBlocks = resp.json().await.context("decoding peer blocks")?;
        Ok(body.blocks)
    }

    /// Announce ourselves to `peer` so it adds us to its peer set.
    pub async fn join(
        &self,
        peer: &PeerNode,
        self_ip: &str,
        self_port: u16,
    ) -> anyhow::Result<AddPeerResponse> {
        let url = format!(
            "{}/node/addpeer?ip={}&port={}",
            peer.base_url(),
            self_ip,
            self_port
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("joining peer {}", peer.tcp_addr()))?;
        if !resp.status().is_success() {
            bail!("peer {} returned {} for addpeer", peer.tcp_addr(), resp.status());
        }
        resp.json().await.context("decoding addpeer response")
    }
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

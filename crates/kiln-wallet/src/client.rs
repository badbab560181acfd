use anyhow::{bail, Context};

use kiln_node::api::{BalancesList, NodeStatus, TxAddRequest, TxAddResponse};

/// Thin HTTP client for a running node's REST API. Raw reqwest + serde_json
/// keeps the wallet binary lean.
pub struct NodeClient {
    url: String,
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn balances(&self) -> anyhow::Result<BalancesList> {
        let resp = self
            .http
            .get(format!("{}/balances/list", self.url))
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;
        if !resp.status().is_success() {
            bail!("node returned {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        resp.json().await.context("decoding balances response")
    }

    pub async fn status(&self) -> anyhow::Result<NodeStatus> {
        let resp = self
            .http
            .get(format!("{}/node/status", self.url))
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;
        if !resp.status().is_success() {
            bail!("node returned {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
        resp.json().await.context("decoding status response")
    }

    /// Submit a transfer; the node signs it with the stored key for `from`.
    pub async fn send_tx(&self, req: &TxAddRequest) -> anyhow::Result<TxAddResponse> {
        let resp = self
            .http
            .post(format!("{}/tx/add", self.url))
            .json(req)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;
        if !resp.status().is_success() {
            bail!(
                "transaction rejected ({}): {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            );
        }
        resp.json().await.context("decoding tx/add response")
    }
}

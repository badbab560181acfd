//! REST surface over the orchestrator's views. Validation failures come back
//! as 400 with a plain-text reason; storage failures as 500. Peer errors
//! never cross this boundary.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use kiln_core::error::KilnError;
use kiln_core::types::{Account, Hash};

use crate::api::{AddPeerResponse, SyncBlocks, TxAddRequest, TxAddResponse};
use crate::node::Node;
use crate::peer::PeerNode;

/// Build the router for a node. Exposed separately from `serve` so tests can
/// drive handlers without a socket.
pub fn router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/balances/list", get(balances_list))
        .route("/node/status", get(node_status))
        .route("/node/sync", get(sync_blocks))
        .route("/node/addpeer", get(add_peer))
        .route("/tx/add", post(tx_add))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(node)
}

/// Serve until `root` is cancelled.
pub async fn serve(node: Arc<Node>, addr: SocketAddr, root: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(node))
        .with_graceful_shutdown(async move { root.cancelled().await })
        .await?;
    Ok(())
}

// Validation errors are the caller's fault; everything else is ours.
fn error_response(err: KilnError) -> Response {
    let status = match err {
        KilnError::TxInsufficientFunds { .. }
        | KilnError::TxNonceMismatch { .. }
        | KilnError::TxForged { .. }
        | KilnError::Crypto(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn balances_list(State(node): State<Arc<Node>>) -> Response {
    Json(node.view_balances().await).into_response()
}

async fn node_status(State(node): State<Arc<Node>>) -> Response {
    Json(node.view_status().await).into_response()
}

#[derive(Deserialize)]
struct SyncParams {
    #[serde(rename = "fromBlock")]
    from_block: String,
}

async fn sync_blocks(State(node): State<Arc<Node>>, params: Option<Query<SyncParams>>) -> Response {
    let Some(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, "fromBlock parameter not found").into_response();
    };
    let Ok(from) = Hash::from_hex(&params.from_block) else {
        return (StatusCode::BAD_REQUEST, "could not parse the provided hash").into_response();
    };
    match node.view_blocks_after(from).await {
        Ok(blocks) => Json(SyncBlocks { blocks }).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct AddPeerParams {
    ip: String,
    port: u16,
}

async fn add_peer(State(node): State<Arc<Node>>, params: Option<Query<AddPeerParams>>) -> Response {
    let Some(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, "ip and port parameters are required").into_response();
    };
    // The caller just reached us, so it starts out active.
    let mut peer = PeerNode::new(params.ip, params.port, false);
    peer.is_active = true;
    node.add_peer(peer);
    Json(AddPeerResponse {
        success: true,
        error: String::new(),
    })
    .into_response()
}

async fn tx_add(State(node): State<Arc<Node>>, Json(req): Json<TxAddRequest>) -> Response {
    let Ok(from) = Account::from_hex(&req.from) else {
        return (StatusCode::BAD_REQUEST, "could not parse the 'from' address").into_response();
    };
    let Ok(to) = Account::from_hex(&req.to) else {
        return (StatusCode::BAD_REQUEST, "could not parse the 'to' address").into_response();
    };
    match node
        .add_transaction(from, &req.from_pwd, to, req.data, req.value)
        .await
    {
        Ok(hash) => Json(TxAddResponse { hash }).into_response(),
        Err(err) => error_response(err),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use kiln_core::types::Balance;
    use kiln_crypto::signer::KeyPair;
    use kiln_state::{store, Genesis};

    use crate::node::NodeConfig;

    fn temp_datadir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln_http_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn test_node(name: &str, balances: &[(Account, Balance)]) -> (Arc<Node>, PathBuf) {
        let dir = temp_datadir(name);
        store::init_dir(&dir).unwrap();
        let mut genesis = Genesis::new();
        for (acc, bal) in balances {
            genesis.balances.insert(*acc, *bal);
        }
        genesis.save(&store::genesis_path(&dir)).unwrap();

        let miner = KeyPair::generate();
        let node = Node::open(NodeConfig::new(dir.clone(), "127.0.0.1", 8080, miner.address)).unwrap();
        (node, dir)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (node, dir) = test_node("health", &[]);
        let response = router(node)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn balances_list_reports_genesis_balances() {
        let alice = KeyPair::generate();
        let (node, dir) = test_node("balances", &[(alice.address, 777)]);

        let response = router(node)
            .oneshot(Request::get("/balances/list").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let v: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(v["hash"].as_str().unwrap(), Hash::zero().to_hex());
        assert_eq!(v["balances"][alice.address.to_hex()], 777);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn status_carries_peers_and_pending_txs() {
        let alice = KeyPair::generate();
        let (node, dir) = test_node("status", &[(alice.address, 1_000)]);
        node.add_peer(PeerNode::new("10.1.1.1", 9000, false));
        node.add_pending_tx(alice.transfer(alice.address, "", 10, 1))
            .await
            .unwrap();

        let response = router(Arc::clone(&node))
            .oneshot(Request::get("/node/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let v: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(v["block_number"], 0);
        assert!(v["known_peers"]["10.1.1.1:9000"].is_object());
        assert_eq!(v["pendingTXs"].as_array().unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn sync_requires_a_valid_cursor() {
        let (node, dir) = test_node("sync_param", &[]);
        let app = router(node);

        let missing = app
            .clone()
            .oneshot(Request::get("/node/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let bad = app
            .clone()
            .oneshot(Request::get("/node/sync?fromBlock=zzz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let empty_chain = app
            .oneshot(
                Request::get(format!("/node/sync?fromBlock={}", Hash::zero().to_hex()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(empty_chain.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_string(empty_chain).await).unwrap();
        assert_eq!(v["blocks"].as_array().unwrap().len(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn addpeer_registers_the_caller_as_active() {
        let (node, dir) = test_node("addpeer", &[]);

        let response = router(Arc::clone(&node))
            .oneshot(
                Request::get("/node/addpeer?ip=10.2.2.2&port=8085")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(v["success"], true);

        let peer = node
            .peers_snapshot()
            .into_iter()
            .find(|p| p.tcp_addr() == "10.2.2.2:8085")
            .unwrap();
        assert!(peer.is_active);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn tx_add_rejects_bad_addresses_and_insufficient_funds() {
        let (node, dir) = test_node("tx_add", &[]);
        let app = router(Arc::clone(&node));

        let bad_addr = app
            .clone()
            .oneshot(
                Request::post("/tx/add")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"from":"nonsense","from_pwd":"pw","to":"0x00","data":"","value":1}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bad_addr.status(), StatusCode::BAD_REQUEST);

        // Well-formed addresses, but no key file and no balance.
        let keyless = KeyPair::generate();
        let body = format!(
            r#"{{"from":"{}","from_pwd":"pw","to":"{}","data":"","value":1}}"#,
            keyless.address.to_hex(),
            keyless.address.to_hex()
        );
        let no_key = app
            .oneshot(
                Request::post("/tx/add")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(no_key.status(), StatusCode::BAD_REQUEST);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! kiln-node, the Kiln full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the data directory: genesis + block log replay
//!   2. Seed the peer set with the bootstrap peer, if given
//!   3. Start the sync loop and the mining supervisor
//!   4. Serve the REST API until Ctrl-C

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kiln_core::constants::BOOTSTRAP_MINE_INTERVAL_SECS;
use kiln_core::types::Account;
use kiln_node::{http, Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "kiln-node", version, about = "Kiln node — an educational permissioned ledger")]
struct Args {
    /// Data directory (genesis, block log, default keystore location).
    #[arg(long, default_value = "~/.kiln")]
    datadir: PathBuf,

    /// Address this node advertises to peers and binds the API on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Account credited with block rewards and fees (0x-prefixed hex).
    #[arg(long)]
    miner: String,

    /// Directory of encrypted key files. Defaults to `<datadir>/keystore`.
    #[arg(long)]
    keystore: Option<PathBuf>,

    /// Bootstrap peer to reconcile with on startup.
    #[arg(long)]
    bootstrap_ip: Option<String>,

    #[arg(long)]
    bootstrap_port: Option<u16>,

    /// Run as a bootstrap node (slower mining tick, yields blocks to others).
    #[arg(long, default_value_t = false)]
    bootstrap: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kiln=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Kiln node starting");

    let miner = Account::from_hex(&args.miner)
        .with_context(|| format!("parsing miner address {:?}", args.miner))?;
    anyhow::ensure!(!miner.is_zero(), "the miner account must not be the zero address");

    let datadir = expand_tilde(&args.datadir);
    let mut config = NodeConfig::new(datadir, args.host.clone(), args.port, miner);
    if let Some(keystore) = args.keystore {
        config.keystore_dir = keystore;
    }
    if let (Some(ip), Some(port)) = (args.bootstrap_ip, args.bootstrap_port) {
        config.bootstrap_peer = Some((ip, port));
    }
    if args.bootstrap {
        config.is_bootstrap = true;
        config.mine_interval = Duration::from_secs(BOOTSTRAP_MINE_INTERVAL_SECS);
    }

    let node = Node::open(config).context("opening node state")?;

    let root = CancellationToken::new();
    let ctrl_c = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            ctrl_c.cancel();
        }
    });

    node.run(root.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("binding {}:{}", args.host, args.port))?;
    http::serve(node.clone(), addr, root).await?;

    node.close().await.context("flushing the ledger store")?;
    info!("node stopped");
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

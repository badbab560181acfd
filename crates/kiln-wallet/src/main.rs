//! kiln-wallet
//!
//! CLI wallet for Kiln. Manages encrypted key files and talks to a running
//! node over its REST API.
//!
//! Usage:
//!   kiln-wallet new-account              [--keydir <path>]
//!   kiln-wallet address                  [--keydir <path>]
//!   kiln-wallet send --from <acc> --to <acc> --value <n> [--data <s>] [--node <url>]
//!   kiln-wallet balances                 [--node <url>]
//!   kiln-wallet status                   [--node <url>]

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use kiln_core::constants::MIN_PASSPHRASE_LEN;
use kiln_crypto::keystore;
use kiln_node::api::TxAddRequest;

mod client;
use client::NodeClient;

#[derive(Parser, Debug)]
#[command(name = "kiln-wallet", version, about = "Kiln wallet — accounts and transfers")]
struct Args {
    /// Directory of encrypted key files.
    #[arg(long, global = true, default_value = "./keystore")]
    keydir: PathBuf,

    /// Node REST endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a keypair, encrypt it under a passphrase, and store it.
    NewAccount,

    /// List the addresses with a key file in the keystore.
    Address,

    /// Submit a transfer; the node signs with your stored key.
    Send {
        /// Sender address (0x-prefixed hex). Must have a key file.
        #[arg(long)]
        from: String,
        /// Recipient address (0x-prefixed hex).
        #[arg(long)]
        to: String,
        /// Amount to transfer (a flat fee is charged on top).
        #[arg(long)]
        value: u64,
        /// Optional data field. Only "reward" is interpreted.
        #[arg(long, default_value = "")]
        data: String,
    },

    /// Print every account balance the node knows about.
    Balances,

    /// Print the node's chain head, peers, and pending transactions.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let args = Args::parse();

    match args.command {
        Command::NewAccount => {
            let passphrase = prompt_passphrase()?;
            let address = keystore::create_account(&args.keydir, &passphrase)
                .context("creating the account")?;
            println!("The account was successfully created: {address}");
        }

        Command::Address => {
            let accounts = keystore::list_accounts(&args.keydir).context("reading the keystore")?;
            if accounts.is_empty() {
                println!("no accounts in {}", args.keydir.display());
            }
            for account in accounts {
                println!("{account}");
            }
        }

        Command::Send { from, to, value, data } => {
            let passphrase = prompt_passphrase()?;
            let client = NodeClient::new(&args.node);
            let resp = client
                .send_tx(&TxAddRequest {
                    from,
                    from_pwd: passphrase,
                    to,
                    data,
                    value,
                })
                .await?;
            println!("Successfully added the transaction: {}", resp.hash);
        }

        Command::Balances => {
            let list = NodeClient::new(&args.node).balances().await?;
            println!("Balances at block {}:", list.hash);
            let mut entries: Vec<_> = list.balances.into_iter().collect();
            entries.sort_by_key(|(acc, _)| *acc);
            for (account, balance) in entries {
                println!("  {account}  {balance}");
            }
        }

        Command::Status => {
            let status = NodeClient::new(&args.node).status().await?;
            println!("Block number: {}", status.block_number);
            println!("Block hash:   {}", status.block_hash);
            println!("Known peers:  {}", status.known_peers.len());
            for (addr, peer) in &status.known_peers {
                println!(
                    "  {addr}  active={}  bootstrap={}",
                    peer.is_active, peer.is_bootstrap
                );
            }
            println!("Pending TXs:  {}", status.pending_txs.len());
            for stx in &status.pending_txs {
                println!("  {} -> {}  value={}", stx.tx.from, stx.tx.to, stx.tx.value);
            }
        }
    }

    Ok(())
}

/// Read a passphrase from stdin (min length enforced again by the keystore).
fn prompt_passphrase() -> anyhow::Result<String> {
    print!("Enter a passphrase (min length {MIN_PASSPHRASE_LEN}): ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading the passphrase")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

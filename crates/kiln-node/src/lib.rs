pub mod api;
pub mod http;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod peer;
pub mod sync;

pub use node::{Node, NodeConfig};
pub use peer::{PeerClient, PeerNode};

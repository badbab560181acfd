pub mod block;
pub mod constants;
pub mod error;
pub mod types;

pub use block::{Block, BlockHeader, BlockRecord, SignedTx, Tx};
pub use constants::*;
pub use error::KilnError;
pub use types::*;

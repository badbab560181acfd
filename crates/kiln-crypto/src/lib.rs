pub mod hash;
pub mod keystore;
pub mod pow;
pub mod signer;

pub use hash::{block_hash, keccak256, sha256, tx_hash};
pub use pow::is_valid_block_hash;
pub use signer::{
    address_of, recover_address, recover_key, sign, sign_tx, sign_tx_with_stored_key, KeyPair,
    SIGNATURE_LEN,
};

//! Encrypted key files, one JSON document per account.
//!
//! A key file seals the 32-byte secp256k1 secret with ChaCha20-Poly1305
//! under a scrypt-derived key, and is named `<address>.json` inside the
//! keystore directory. The passphrase never touches disk.

use std::fs;
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use kiln_core::constants::MIN_PASSPHRASE_LEN;
use kiln_core::error::KilnError;
use kiln_core::types::Account;

use crate::signer::address_of;

// scrypt cost parameters: N = 2^15, r = 8, p = 1. Interactive-login strength.
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

#[derive(Serialize, Deserialize)]
struct KdfParams {
    salt: String,
    log_n: u8,
    r: u32,
    p: u32,
}

#[derive(Serialize, Deserialize)]
struct CryptoEnvelope {
    kdf: String,
    kdfparams: KdfParams,
    cipher: String,
    nonce: String,
    ciphertext: String,
}

/// The on-disk key file document.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    address: Account,
    crypto: CryptoEnvelope,
}

fn key_file_path(keydir: &Path, address: &Account) -> PathBuf {
    keydir.join(format!("{}.json", address.to_hex()))
}

fn derive_cipher_key(passphrase: &str, salt: &[u8], log_n: u8, r: u32, p: u32) -> Result<Zeroizing<[u8; 32]>, KilnError> {
    let params = Params::new(log_n, r, p, 32)
        .map_err(|e| KilnError::Crypto(format!("bad scrypt parameters: {e}")))?;
    let mut out = Zeroizing::new([0u8; 32]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, out.as_mut())
        .map_err(|e| KilnError::Crypto(format!("scrypt failed: {e}")))?;
    Ok(out)
}

/// Generate a fresh keypair, seal it under `passphrase`, and write the key
/// file into `keydir` (created if absent). Returns the new address.
pub fn create_account(keydir: &Path, passphrase: &str) -> Result<Account, KilnError> {
    if passphrase.trim().len() < MIN_PASSPHRASE_LEN {
        return Err(KilnError::Crypto(format!(
            "passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
        )));
    }
    fs::create_dir_all(keydir)?;

    let signing = SigningKey::random(&mut OsRng);
    let address = address_of(signing.verifying_key());

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher_key = derive_cipher_key(passphrase, &salt, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(cipher_key.as_ref()));
    let secret = Zeroizing::new(signing.to_bytes().to_vec());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
        .map_err(|_| KilnError::Crypto("key encryption failed".into()))?;

    let doc = KeyFile {
        address,
        crypto: CryptoEnvelope {
            kdf: "scrypt".into(),
            kdfparams: KdfParams {
                salt: hex::encode(salt),
                log_n: SCRYPT_LOG_N,
                r: SCRYPT_R,
                p: SCRYPT_P,
            },
            cipher: "chacha20poly1305".into(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        },
    };

    let path = key_file_path(keydir, &address);
    fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
    Ok(address)
}

/// Open `address`'s key file and decrypt the signing key with `passphrase`.
pub fn load_key(keydir: &Path, address: &Account, passphrase: &str) -> Result<SigningKey, KilnError> {
    let path = key_file_path(keydir, address);
    let raw = fs::read(&path).map_err(|e| {
        KilnError::Crypto(format!("no key file for {address} in {}: {e}", keydir.display()))
    })?;
    let doc: KeyFile = serde_json::from_slice(&raw)?;

    if doc.crypto.kdf != "scrypt" || doc.crypto.cipher != "chacha20poly1305" {
        return Err(KilnError::Crypto(format!(
            "unsupported key file scheme {}/{}",
            doc.crypto.kdf, doc.crypto.cipher
        )));
    }

    let salt = hex::decode(&doc.crypto.kdfparams.salt)
        .map_err(|e| KilnError::Crypto(format!("bad salt: {e}")))?;
    let nonce = hex::decode(&doc.crypto.nonce)
        .map_err(|e| KilnError::Crypto(format!("bad nonce: {e}")))?;
    let ciphertext = hex::decode(&doc.crypto.ciphertext)
        .map_err(|e| KilnError::Crypto(format!("bad ciphertext: {e}")))?;

    let cipher_key = derive_cipher_key(
        passphrase,
        &salt,
        doc.crypto.kdfparams.log_n,
        doc.crypto.kdfparams.r,
        doc.crypto.kdfparams.p,
    )?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(cipher_key.as_ref()));
    let secret = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| KilnError::Crypto("wrong passphrase or corrupt key file".into()))?,
    );

    let signing = SigningKey::from_slice(&secret)
        .map_err(|e| KilnError::Crypto(format!("invalid secret key: {e}")))?;

    // The derived address must match the file name / document.
    let derived = address_of(signing.verifying_key());
    if derived != *address {
        return Err(KilnError::Crypto(format!(
            "key file mismatch: document claims {address}, key derives {derived}"
        )));
    }
    Ok(signing)
}

/// List every address with a key file in `keydir`.
pub fn list_accounts(keydir: &Path) -> Result<Vec<Account>, KilnError> {
    let mut accounts = Vec::new();
    if !keydir.exists() {
        return Ok(accounts);
    }
    for entry in fs::read_dir(keydir)? {
        let name = entry?.file_name();
        if let Some(stem) = name.to_string_lossy().strip_suffix(".json") {
            if let Ok(addr) = Account::from_hex(stem) {
                accounts.push(addr);
            }
        }
    }
    accounts.sort();
    Ok(accounts)
}

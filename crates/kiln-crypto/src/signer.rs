use std::path::Path;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use kiln_core::block::{SignedTx, Tx};
use kiln_core::error::KilnError;
use kiln_core::types::{Account, Hash, Signature};

use crate::hash::{keccak256, tx_hash};
use crate::keystore;

/// Recoverable signatures are exactly 64 bytes of (r ‖ s) plus one recovery
/// byte. Anything else is rejected.
pub const SIGNATURE_LEN: usize = 65;

/// Derive the 20-byte address from a public key: Keccak-256 of the
/// uncompressed encoding (without the 0x04 tag), low 20 bytes.
pub fn address_of(key: &VerifyingKey) -> Account {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Account::from_bytes(addr)
}

/// Sign a 32-byte message hash, producing the 65-byte recoverable form.
pub fn sign(msg: &Hash, key: &SigningKey) -> Result<Signature, KilnError> {
    let (sig, recovery) = key
        .sign_prehash_recoverable(msg.as_bytes())
        .map_err(|e| KilnError::Crypto(format!("signing failed: {e}")))?;
    let mut bytes = sig.to_vec();
    bytes.push(recovery.to_byte());
    Ok(Signature(bytes))
}

/// Recover the signer's public key from (message hash, signature).
pub fn recover_key(msg: &Hash, sig: &Signature) -> Result<VerifyingKey, KilnError> {
    let bytes = sig.as_bytes();
    if bytes.len() != SIGNATURE_LEN {
        return Err(KilnError::Crypto(format!(
            "wrong signature length: got {}, want {SIGNATURE_LEN}",
            bytes.len()
        )));
    }
    let ecdsa = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|e| KilnError::Crypto(format!("malformed signature: {e}")))?;
    let recovery = RecoveryId::from_byte(bytes[64])
        .ok_or_else(|| KilnError::Crypto(format!("invalid recovery id {}", bytes[64])))?;
    VerifyingKey::recover_from_prehash(msg.as_bytes(), &ecdsa, recovery)
        .map_err(|e| KilnError::Crypto(format!("recovery failed: {e}")))
}

/// Recover the signer's address from (message hash, signature).
pub fn recover_address(msg: &Hash, sig: &Signature) -> Result<Account, KilnError> {
    Ok(address_of(&recover_key(msg, sig)?))
}

/// Hash and sign a transaction.
pub fn sign_tx(tx: Tx, key: &SigningKey) -> Result<SignedTx, KilnError> {
    let sig = sign(&tx_hash(&tx), key)?;
    Ok(SignedTx::new(tx, sig))
}

/// Materialize `from`'s private key from its encrypted key file and sign.
pub fn sign_tx_with_stored_key(
    tx: Tx,
    from: &Account,
    passphrase: &str,
    keydir: &Path,
) -> Result<SignedTx, KilnError> {
    let key = keystore::load_key(keydir, from, passphrase)?;
    sign_tx(tx, &key)
}

// ── KeyPair ──────────────────────────────────────────────────────────────────

/// A secp256k1 keypair with its derived address. Used by the wallet and by
/// tests; node code only ever sees addresses and signed transactions.
pub struct KeyPair {
    pub address: Account,
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut OsRng);
        let address = address_of(signing.verifying_key());
        Self { address, signing }
    }

    pub fn from_signing_key(signing: SigningKey) -> Self {
        let address = address_of(signing.verifying_key());
        Self { address, signing }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Build and sign a transfer from this keypair's address.
    pub fn transfer(&self, to: Account, data: impl Into<String>, value: u64, nonce: u64) -> SignedTx {
        let tx = Tx::new(self.address, to, data, value, nonce);
        sign_tx(tx, &self.signing).expect("signing with a freshly generated key is infallible")
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ address: {:?} }}", self.address)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_recover_round_trip() {
        let kp = KeyPair::generate();
        let msg = Hash::from_bytes(crate::hash::sha256(b"hello kiln"));
        let sig = sign(&msg, kp.signing_key()).unwrap();
        assert_eq!(sig.as_bytes().len(), SIGNATURE_LEN);
        assert_eq!(recover_address(&msg, &sig).unwrap(), kp.address);
    }

    #[test]
    fn recovered_address_differs_for_tampered_message() {
        let kp = KeyPair::generate();
        let msg = Hash::from_bytes(crate::hash::sha256(b"original"));
        let sig = sign(&msg, kp.signing_key()).unwrap();

        let other = Hash::from_bytes(crate::hash::sha256(b"tampered"));
        match recover_address(&other, &sig) {
            Ok(addr) => assert_ne!(addr, kp.address),
            Err(KilnError::Crypto(_)) => {}
            Err(e) => panic!("unexpected error kind: {e}"),
        }
    }

    #[test]
    fn wrong_length_signature_rejected() {
        let msg = Hash::zero();
        for len in [0, 64, 66] {
            let err = recover_address(&msg, &Signature(vec![0u8; len])).unwrap_err();
            assert!(matches!(err, KilnError::Crypto(_)), "len {len} must be rejected");
        }
    }

    #[test]
    fn signed_tx_is_authentic_for_its_sender_only() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let stx = alice.transfer(bob.address, "", 100, 1);
        let recovered = recover_address(&tx_hash(&stx.tx), &stx.sig).unwrap();
        assert_eq!(recovered, alice.address);
        assert_ne!(recovered, bob.address);
    }
}

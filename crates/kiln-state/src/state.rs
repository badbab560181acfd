use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use kiln_core::block::{Block, BlockRecord, SignedTx, Tx};
use kiln_core::constants::{FEE, REWARD};
use kiln_core::error::KilnError;
use kiln_core::types::{Account, Balance, Hash, Nonce};

use kiln_crypto::hash::{block_hash, tx_hash};
use kiln_crypto::pow::is_valid_block_hash;
use kiln_crypto::signer::recover_address;

use crate::genesis::Genesis;
use crate::store;

// ── Pending view ─────────────────────────────────────────────────────────────

/// A deep copy of the mutable maps. Every block is applied here first; the
/// live state is only touched after the whole payload validates and the
/// record is on disk.
struct PendingView {
    balances: HashMap<Account, Balance>,
    next_nonce: HashMap<Account, Nonce>,
}

impl PendingView {
    fn apply_signed_tx(&mut self, stx: &SignedTx) -> Result<(), KilnError> {
        let tx = &stx.tx;
        let hash = tx_hash(tx);

        // Authenticity: the signature must recover to the claimed sender.
        let signer = recover_address(&hash, &stx.sig)
            .map_err(|_| KilnError::TxForged { tx_hash: hash })?;
        if signer != tx.from {
            return Err(KilnError::TxForged { tx_hash: hash });
        }

        // Reward transactions mint to the recipient; no fee, no nonce.
        if tx.is_reward() {
            *self.balances.entry(tx.to).or_default() += tx.value;
            return Ok(());
        }

        let expected = self.next_nonce.get(&tx.from).copied().unwrap_or(0) + 1;
        if tx.nonce != expected {
            return Err(KilnError::TxNonceMismatch {
                account: tx.from,
                expected,
                got: tx.nonce,
            });
        }

        let need = tx.value + FEE;
        let have = self.balances.get(&tx.from).copied().unwrap_or(0);
        if have < need {
            return Err(KilnError::TxInsufficientFunds {
                account: tx.from,
                need,
                have,
            });
        }

        self.balances.insert(tx.from, have - need);
        *self.balances.entry(tx.to).or_default() += tx.value;
        self.next_nonce.insert(tx.from, tx.nonce);
        Ok(())
    }
}

// ── State ────────────────────────────────────────────────────────────────────

/// In-memory chain state: balances, per-sender nonces, and the last-block
/// cursor, rebuilt on startup from genesis plus a full log replay. Holds the
/// exclusive writer handle to the block log.
pub struct State {
    balances: HashMap<Account, Balance>,
    next_nonce: HashMap<Account, Nonce>,
    last_block: Block,
    last_hash: Hash,
    has_genesis_block: bool,
    datadir: PathBuf,
    log: File,
}

impl State {
    /// Ensure the on-disk layout, load genesis balances, then replay the
    /// block log in order. Any replay error is fatal.
    ///
    /// `has_genesis_block` toggles chain-continuity enforcement in
    /// `add_block`; only migration tooling and tests pass `false`.
    pub fn open(datadir: &Path, has_genesis_block: bool) -> Result<Self, KilnError> {
        store::init_dir(datadir)?;
        let genesis = Genesis::load(&store::genesis_path(datadir))?;
        let log = store::open_log(datadir)?;

        let mut state = Self {
            balances: genesis.balances,
            next_nonce: HashMap::new(),
            last_block: Block::default(),
            last_hash: Hash::zero(),
            has_genesis_block,
            datadir: datadir.to_path_buf(),
            log,
        };

        let mut replayed = 0u64;
        store::replay(datadir, |record| {
            state.replay_record(record)?;
            replayed += 1;
            Ok(())
        })?;
        info!(
            datadir = %datadir.display(),
            blocks = replayed,
            chain_id = %genesis.chain_id,
            "state rebuilt from genesis and block log"
        );
        Ok(state)
    }

    /// Flush the block log to stable storage.
    pub fn sync(&self) -> Result<(), KilnError> {
        self.log.sync_all()?;
        Ok(())
    }

    /// Flush the log and drop the writer handle.
    pub fn close(self) -> Result<(), KilnError> {
        self.sync()
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Balance sufficiency against the current committed balances. Does not
    /// check the signature; that happens in `add_block`.
    pub fn is_valid_tx(&self, tx: &Tx) -> Result<(), KilnError> {
        if tx.is_reward() {
            return Ok(());
        }
        let need = tx.value + FEE;
        let have = self.balances.get(&tx.from).copied().unwrap_or(0);
        if have < need {
            return Err(KilnError::TxInsufficientFunds {
                account: tx.from,
                need,
                have,
            });
        }
        Ok(())
    }

    /// The authoritative write path. Validates chain continuity, the PoW
    /// predicate, and every payload transaction against a pending copy;
    /// appends the record (the commit point) and only then publishes the new
    /// balances, nonces, and cursor. The miner is credited
    /// `REWARD + payload_len · FEE` on commit.
    pub fn add_block(&mut self, block: &Block) -> Result<Hash, KilnError> {
        if self.has_genesis_block {
            let expected = self.last_block.header.number + 1;
            if block.header.number != expected {
                return Err(KilnError::BlockNumberMismatch {
                    expected,
                    got: block.header.number,
                });
            }
            if block.header.parent_hash != self.last_hash {
                return Err(KilnError::ParentHashMismatch {
                    expected: self.last_hash,
                    got: block.header.parent_hash,
                });
            }
        }

        let hash = block_hash(block);
        if !is_valid_block_hash(&hash) {
            return Err(KilnError::InvalidProofOfWork(hash));
        }

        let mut pending = PendingView {
            balances: self.balances.clone(),
            next_nonce: self.next_nonce.clone(),
        };
        for stx in &block.payload {
            pending.apply_signed_tx(stx)?;
        }

        store::append_record(&mut self.log, &hash, block)?;

        self.balances = pending.balances;
        self.next_nonce = pending.next_nonce;
        self.last_block = block.clone();
        self.last_hash = hash;
        *self.balances.entry(block.header.miner).or_default() +=
            REWARD + block.payload.len() as Balance * FEE;

        info!(
            number = block.header.number,
            hash = %hash,
            txs = block.payload.len(),
            miner = %block.header.miner,
            "block committed"
        );
        Ok(hash)
    }

    // Startup replay: the log is local and was validated when written, so
    // chain-continuity and PoW checks are skipped; the payload application
    // and miner credit are identical to `add_block`, which keeps replay
    // deterministic with the original application.
    fn replay_record(&mut self, record: BlockRecord) -> Result<(), KilnError> {
        let mut pending = PendingView {
            balances: self.balances.clone(),
            next_nonce: self.next_nonce.clone(),
        };
        for stx in &record.block.payload {
            pending.apply_signed_tx(stx)?;
        }

        self.balances = pending.balances;
        self.next_nonce = pending.next_nonce;
        *self.balances.entry(record.block.header.miner).or_default() +=
            REWARD + record.block.payload.len() as Balance * FEE;
        self.last_hash = record.hash;
        self.last_block = record.block;

        debug!(number = self.last_block.header.number, hash = %self.last_hash, "block replayed");
        Ok(())
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn next_block_number(&self) -> u64 {
        self.last_block.header.number + 1
    }

    /// The nonce the account's next transaction must carry.
    pub fn next_account_nonce(&self, account: &Account) -> Nonce {
        self.next_nonce.get(account).copied().unwrap_or(0) + 1
    }

    pub fn last_hash(&self) -> Hash {
        self.last_hash
    }

    pub fn last_block(&self) -> &Block {
        &self.last_block
    }

    pub fn balance_of(&self, account: &Account) -> Balance {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn balances_snapshot(&self) -> HashMap<Account, Balance> {
        self.balances.clone()
    }

    /// Blocks strictly after `after`, from a fresh read handle on the log.
    pub fn blocks_after(&self, after: &Hash) -> Result<Vec<Block>, KilnError> {
        store::blocks_after(&self.datadir, after)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

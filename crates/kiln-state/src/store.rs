//! The append-only block log: one JSON `BlockRecord` per LF-terminated line
//! under `<datadir>/database/blocks.db`, alongside `genesis.json`.
//!
//! The log is written only through `append` (held exclusively by `State`);
//! readers (`replay`, `blocks_after`) open their own short-lived handles.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use kiln_core::block::{Block, BlockRecord};
use kiln_core::error::KilnError;
use kiln_core::types::Hash;

use kiln_crypto::hash::block_hash;

use crate::genesis::Genesis;

pub fn database_dir(datadir: &Path) -> PathBuf {
    datadir.join("database")
}

pub fn genesis_path(datadir: &Path) -> PathBuf {
    database_dir(datadir).join("genesis.json")
}

pub fn blocks_path(datadir: &Path) -> PathBuf {
    database_dir(datadir).join("blocks.db")
}

/// Ensure `<datadir>/database/` exists with a genesis file and an (empty)
/// block log. A missing genesis is initialized to the default document; an
/// existing one is left untouched.
pub fn init_dir(datadir: &Path) -> Result<(), KilnError> {
    fs::create_dir_all(database_dir(datadir))?;
    let genesis = genesis_path(datadir);
    if !genesis.exists() {
        Genesis::new().save(&genesis)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(blocks_path(datadir))?;
    Ok(())
}

/// Open the writer handle used by `State` for the lifetime of the node.
pub fn open_log(datadir: &Path) -> Result<File, KilnError> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(blocks_path(datadir))?)
}

// Serialize the record from borrows so `append` need not clone the block.
#[derive(Serialize)]
struct RecordRef<'a> {
    hash: &'a Hash,
    block: &'a Block,
}

/// Append one block to the log: hash it, write `{hash, block}\n`, flush to
/// the OS. Returns the block hash. This is the chain's commit point.
pub fn append(log: &mut File, block: &Block) -> Result<Hash, KilnError> {
    let hash = block_hash(block);
    append_record(log, &hash, block)?;
    Ok(hash)
}

// For callers that already hold the hash (the validator computes it for the
// PoW check before committing).
pub(crate) fn append_record(log: &mut File, hash: &Hash, block: &Block) -> Result<(), KilnError> {
    let mut line = serde_json::to_vec(&RecordRef { hash, block })?;
    line.push(b'\n');
    log.write_all(&line)?;
    log.flush()?;
    Ok(())
}

/// Stream the log in order, invoking `apply` per record. The first malformed
/// line aborts the replay; a corrupt log is fatal, never skipped.
pub fn replay<F>(datadir: &Path, mut apply: F) -> Result<(), KilnError>
where
    F: FnMut(BlockRecord) -> Result<(), KilnError>,
{
    let reader = BufReader::new(File::open(blocks_path(datadir))?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record: BlockRecord =
            serde_json::from_str(&line).map_err(|e| KilnError::CorruptBlockRecord {
                line: idx + 1,
                reason: e.to_string(),
            })?;
        apply(record)?;
    }
    Ok(())
}

/// Linear scan for the blocks strictly after `after`. The zero hash means
/// "everything"; an unknown hash yields an empty list.
pub fn blocks_after(datadir: &Path, after: &Hash) -> Result<Vec<Block>, KilnError> {
    let mut blocks = Vec::new();
    let mut appending = after.is_zero();
    replay(datadir, |record| {
        if appending {
            blocks.push(record.block);
        } else if record.hash == *after {
            appending = true;
        }
        Ok(())
    })?;
    Ok(blocks)
}

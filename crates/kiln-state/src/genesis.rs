use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use kiln_core::constants::DEFAULT_CHAIN_ID;
use kiln_core::error::KilnError;
use kiln_core::types::{Account, Balance};

/// The genesis document: the only out-of-band initial condition of a chain.
/// Every other piece of state is rebuilt from the block log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub genesis_time: String,
    pub chain_id: String,
    pub balances: HashMap<Account, Balance>,
}

impl Genesis {
    /// A fresh genesis with no preloaded balances, stamped now.
    pub fn new() -> Self {
        Self {
            genesis_time: Utc::now().to_rfc3339(),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            balances: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, KilnError> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), KilnError> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

impl Default for Genesis {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = std::env::temp_dir().join("kiln_genesis_test_round_trip");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("genesis.json");

        let mut genesis = Genesis::new();
        genesis
            .balances
            .insert(Account::from_bytes([7u8; 20]), 1_000_000);
        genesis.save(&path).unwrap();

        let loaded = Genesis::load(&path).unwrap();
        assert_eq!(loaded, genesis);
        assert_eq!(loaded.chain_id, DEFAULT_CHAIN_ID);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn balances_are_keyed_by_hex_address() {
        let mut genesis = Genesis::new();
        let acc = Account::from_bytes([0x11; 20]);
        genesis.balances.insert(acc, 42);

        let json = serde_json::to_string(&genesis).unwrap();
        assert!(json.contains(&format!("\"{}\":42", acc.to_hex())));
    }
}

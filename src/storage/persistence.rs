use crate::core::Block;
use crate::error::{NodeError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "chain_state.json";

/// The persisted unit: the full chain, the difficulty state, and any
/// deployed-contract state, serialized together.
#[derive(Serialize, Deserialize)]
pub struct ChainState {
    pub chain: Vec<Block>,
    pub bits: u32,
    pub target: String,
    #[serde(default)]
    pub contracts: serde_json::Map<String, serde_json::Value>,
}

pub fn state_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STATE_FILE)
}

/// Write the state file, first copying any existing file to a timestamped
/// backup. The backup is best-effort: a failed backup is logged but does
/// not block the save, so a crash mid-write always leaves the prior backup
/// recoverable.
pub fn save_state(data_dir: &Path, state: &ChainState) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let path = state_file_path(data_dir);

    if path.exists() {
        let stamp = crate::utils::current_timestamp().unwrap_or(0);
        let backup = data_dir.join(format!("chain_state.{stamp}.bak"));
        if let Err(e) = fs::copy(&path, &backup) {
            warn!("Could not write state backup {}: {e}", backup.display());
        }
    }

    let contents = serde_json::to_string(state)?;
    fs::write(&path, contents)?;
    Ok(())
}

/// Load the state file if one exists. Blocks come back with their stored
/// hashes and Merkle roots verbatim; recomputation is reserved for
/// explicit chain validation.
pub fn load_state(data_dir: &Path) -> Result<Option<ChainState>> {
    let path = state_file_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let state: ChainState = serde_json::from_str(&contents)
        .map_err(|e| NodeError::Persistence(format!("Corrupt state file: {e}")))?;
    info!(
        "Loaded chain state: {} blocks, bits {:#010x}",
        state.chain.len(),
        state.bits
    );
    Ok(Some(state))
}

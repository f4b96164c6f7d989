use crate::error::{NodeError, Result};
use crate::wallet::Wallet;
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallets.json";

/// File-backed collection of wallets, keyed by address.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    file_path: PathBuf,
}

impl Wallets {
    /// Load the wallet collection from the default location, creating an
    /// empty collection if no file exists yet.
    pub fn new() -> Wallets {
        let file_path = crate::config::GLOBAL_CONFIG.get_data_dir().join(WALLET_FILE);
        Self::with_file(&file_path)
    }

    pub fn with_file(file_path: &Path) -> Wallets {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            file_path: file_path.to_path_buf(),
        };
        if let Err(e) = wallets.load_from_file() {
            warn!("Could not load wallet file, starting empty: {e}");
        }
        wallets
    }

    /// Create a new wallet, persist the collection, and return its address.
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new();
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(&self.file_path)?;
        self.wallets = serde_json::from_str(&contents)
            .map_err(|e| NodeError::Wallet(format!("Corrupt wallet file: {e}")))?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.wallets)?;
        fs::write(&self.file_path, contents)?;
        Ok(())
    }
}

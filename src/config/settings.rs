use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:7101";
static DEFAULT_DATA_DIR: &str = "data";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const DATA_DIR_KEY: &str = "DATA_DIR";
const PEERS_KEY: &str = "PEERS";

/// Process configuration, seeded from environment variables.
///
/// Holds node-level settings only; the ledger itself is an explicit handle
/// passed to the components that need it, never a global.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        map.insert(
            String::from(NODE_ADDRESS_KEY),
            env::var(NODE_ADDRESS_KEY).unwrap_or_else(|_| String::from(DEFAULT_NODE_ADDR)),
        );
        map.insert(
            String::from(DATA_DIR_KEY),
            env::var(DATA_DIR_KEY).unwrap_or_else(|_| String::from(DEFAULT_DATA_DIR)),
        );
        if let Ok(mining_addr) = env::var(MINING_ADDRESS_KEY) {
            map.insert(String::from(MINING_ADDRESS_KEY), mining_addr);
        }
        if let Ok(peers) = env::var(PEERS_KEY) {
            map.insert(String::from(PEERS_KEY), peers);
        }

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_node_addr(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(NODE_ADDRESS_KEY)
            .expect("Node address should always be present in config")
            .clone()
    }

    pub fn set_node_addr(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(NODE_ADDRESS_KEY), addr);
    }

    pub fn get_data_dir(&self) -> PathBuf {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        PathBuf::from(
            inner
                .get(DATA_DIR_KEY)
                .expect("Data dir should always be present in config"),
        )
    }

    pub fn set_data_dir(&self, dir: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(DATA_DIR_KEY), dir);
    }

    pub fn set_mining_addr(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        let _ = inner.insert(String::from(MINING_ADDRESS_KEY), addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.get(MINING_ADDRESS_KEY).cloned()
    }

    pub fn is_miner(&self) -> bool {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.contains_key(MINING_ADDRESS_KEY)
    }

    /// Comma-separated seed peer list handed to the sync protocol.
    /// Peer discovery itself is external to this node.
    pub fn get_seed_peers(&self) -> Vec<String> {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(PEERS_KEY)
            .map(|peers| {
                peers
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_seed_peers(&self, peers: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        inner.insert(String::from(PEERS_KEY), peers);
    }
}

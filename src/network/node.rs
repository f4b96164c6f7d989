use crate::utils::current_timestamp;
use log::{debug, error};
use std::sync::RwLock;

/// Exponential backoff base applied after a failed peer exchange.
const BACKOFF_BASE_MS: i64 = 5_000;
/// Backoff never grows past this, so a recovered peer is retried within
/// a bounded window.
const BACKOFF_CAP_MS: i64 = 300_000;

#[derive(Debug, Clone)]
pub struct Peer {
    addr: String,
    failures: u32,
    retry_after: i64,
}

impl Peer {
    fn new(addr: String) -> Peer {
        Peer {
            addr,
            failures: 0,
            retry_after: 0,
        }
    }

    pub fn get_addr(&self) -> &str {
        &self.addr
    }

    pub fn get_failures(&self) -> u32 {
        self.failures
    }
}

/// Known peers with per-peer failure tracking. Peers that keep failing
/// are backed off exponentially rather than evicted, since a restarted
/// peer at the same address is the common case.
pub struct PeerDirectory {
    inner: RwLock<Vec<Peer>>,
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerDirectory {
    pub fn new() -> PeerDirectory {
        PeerDirectory {
            inner: RwLock::new(vec![]),
        }
    }

    /// Register a peer address. Duplicates and our own listen address are
    /// ignored.
    pub fn add_peer(&self, addr: &str, own_addr: &str) {
        if addr.is_empty() || addr == own_addr {
            return;
        }
        match self.inner.write() {
            Ok(mut inner) => {
                if !inner.iter().any(|peer| peer.addr == addr) {
                    debug!("Registered peer {addr}");
                    inner.push(Peer::new(addr.to_string()));
                }
            }
            Err(_) => {
                error!("Failed to acquire write lock on peer directory");
            }
        }
    }

    /// Peers currently eligible for contact: anything not inside a backoff
    /// window.
    pub fn active_peers(&self) -> Vec<String> {
        let now = current_timestamp().unwrap_or(0);
        match self.inner.read() {
            Ok(inner) => inner
                .iter()
                .filter(|peer| peer.retry_after <= now)
                .map(|peer| peer.addr.clone())
                .collect(),
            Err(_) => {
                error!("Failed to acquire read lock on peer directory");
                Vec::new()
            }
        }
    }

    pub fn record_success(&self, addr: &str) {
        match self.inner.write() {
            Ok(mut inner) => {
                if let Some(peer) = inner.iter_mut().find(|peer| peer.addr == addr) {
                    peer.failures = 0;
                    peer.retry_after = 0;
                }
            }
            Err(_) => {
                error!("Failed to acquire write lock on peer directory");
            }
        }
    }

    /// Bump the failure count and push the retry horizon out exponentially.
    pub fn record_failure(&self, addr: &str) {
        let now = current_timestamp().unwrap_or(0);
        match self.inner.write() {
            Ok(mut inner) => {
                if let Some(peer) = inner.iter_mut().find(|peer| peer.addr == addr) {
                    peer.failures = peer.failures.saturating_add(1);
                    let shift = peer.failures.min(6);
                    let backoff = (BACKOFF_BASE_MS << shift).min(BACKOFF_CAP_MS);
                    peer.retry_after = now + backoff;
                    debug!(
                        "Peer {addr} failed ({} failures), backing off {backoff}ms",
                        peer.failures
                    );
                }
            }
            Err(_) => {
                error!("Failed to acquire write lock on peer directory");
            }
        }
    }

    pub fn is_known(&self, addr: &str) -> bool {
        match self.inner.read() {
            Ok(inner) => inner.iter().any(|peer| peer.addr == addr),
            Err(_) => {
                error!("Failed to acquire read lock on peer directory");
                false
            }
        }
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        match self.inner.read() {
            Ok(inner) => inner.to_vec(),
            Err(_) => {
                error!("Failed to acquire read lock on peer directory");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

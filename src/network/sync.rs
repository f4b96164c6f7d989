use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, SharedLedger, Transaction};
use crate::error::{NodeError, Result};
use crate::network::PeerDirectory;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

const TCP_CONNECT_TIMEOUT_MS: u64 = 5_000;
const TCP_WRITE_TIMEOUT_MS: u64 = 5_000;
const TCP_READ_TIMEOUT_MS: u64 = 10_000;

/// Wire messages, newline-free JSON over TCP. Requests carry the sender's
/// listen address so the receiving node can register it as a peer.
#[derive(Debug, Serialize, Deserialize)]
pub enum Package {
    GetChainStatus {
        addr_from: String,
    },
    ChainStatus {
        addr_from: String,
        chain_length: u64,
    },
    GetChain {
        addr_from: String,
    },
    Chain {
        addr_from: String,
        blocks: Vec<Block>,
    },
    Block {
        addr_from: String,
        block: Block,
    },
    Tx {
        addr_from: String,
        transaction: Transaction,
    },
    Discover {
        addr_from: String,
        chain_length: u64,
    },
}

fn parse_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse::<SocketAddr>()
        .map_err(|e| NodeError::Network(format!("Invalid peer address {addr}: {e}")))
}

fn connect(addr: &str) -> Result<TcpStream> {
    let socket_addr = parse_addr(addr)?;
    let stream =
        TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_CONNECT_TIMEOUT_MS))
            .map_err(|e| NodeError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT_MS)))
        .map_err(|e| NodeError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT_MS)))
        .map_err(|e| NodeError::Network(format!("Failed to set read timeout: {e}")))?;
    Ok(stream)
}

/// Fire-and-forget send, used for pushes that expect no reply.
pub fn send_package(addr: &str, pkg: &Package) -> Result<()> {
    let mut stream = connect(addr)?;
    serde_json::to_writer(&stream, pkg)
        .map_err(|e| NodeError::Network(format!("Failed to send package to {addr}: {e}")))?;
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

/// Request/response exchange: send one package, half-close the write side,
/// and read exactly one package back.
pub fn request(addr: &str, pkg: &Package) -> Result<Package> {
    let mut stream = connect(addr)?;
    serde_json::to_writer(&stream, pkg)
        .map_err(|e| NodeError::Network(format!("Failed to send request to {addr}: {e}")))?;
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Write);

    let reader = BufReader::new(&stream);
    let mut packages = serde_json::Deserializer::from_reader(reader).into_iter::<Package>();
    match packages.next() {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(e)) => Err(NodeError::Network(format!(
            "Malformed reply from {addr}: {e}"
        ))),
        None => Err(NodeError::Network(format!("No reply from {addr}"))),
    }
}

/// Push a freshly mined or accepted block to every active peer.
pub fn broadcast_block(peers: &PeerDirectory, block: &Block) {
    let own_addr = GLOBAL_CONFIG.get_node_addr();
    for peer in peers.active_peers() {
        let pkg = Package::Block {
            addr_from: own_addr.clone(),
            block: block.clone(),
        };
        match send_package(&peer, &pkg) {
            Ok(()) => peers.record_success(&peer),
            Err(e) => {
                warn!("Failed to push block to {peer}: {e}");
                peers.record_failure(&peer);
            }
        }
    }
}

/// Forward an accepted transaction to active peers, skipping whoever sent
/// it to us.
pub fn broadcast_tx(peers: &PeerDirectory, tx: &Transaction, skip_addr: &str) {
    let own_addr = GLOBAL_CONFIG.get_node_addr();
    for peer in peers.active_peers() {
        if peer == skip_addr {
            continue;
        }
        let pkg = Package::Tx {
            addr_from: own_addr.clone(),
            transaction: tx.clone(),
        };
        match send_package(&peer, &pkg) {
            Ok(()) => peers.record_success(&peer),
            Err(e) => {
                warn!("Failed to forward transaction to {peer}: {e}");
                peers.record_failure(&peer);
            }
        }
    }
}

/// One full sync round: probe every active peer for its chain length,
/// then fetch from the single peer reporting the greatest length ahead
/// of ours and attempt replacement. The ledger lock is never held across
/// peer I/O; lengths are re-checked under the write lock inside
/// `replace_chain`. Probe failures are isolated per peer.
pub fn sync_with_peers(ledger: &SharedLedger, peers: &PeerDirectory) {
    let own_addr = GLOBAL_CONFIG.get_node_addr();

    let local_length = match ledger.read() {
        Ok(chain) => chain.get_length(),
        Err(_) => {
            log::error!("Failed to acquire read lock on ledger for sync");
            return;
        }
    };

    let mut best: Option<(String, u64)> = None;
    for peer in peers.active_peers() {
        let probe = Package::GetChainStatus {
            addr_from: own_addr.clone(),
        };
        let peer_length = match request(&peer, &probe) {
            Ok(Package::ChainStatus { chain_length, .. }) => {
                peers.record_success(&peer);
                chain_length
            }
            Ok(other) => {
                warn!("Unexpected status reply from {peer}: {other:?}");
                peers.record_failure(&peer);
                continue;
            }
            Err(e) => {
                debug!("Status probe to {peer} failed: {e}");
                peers.record_failure(&peer);
                continue;
            }
        };

        if peer_length > local_length
            && best.as_ref().map(|(_, length)| peer_length > *length).unwrap_or(true)
        {
            best = Some((peer, peer_length));
        }
    }

    if let Some((peer, peer_length)) = best {
        info!("Peer {peer} is ahead ({peer_length} > {local_length}), fetching chain");
        sync_from(ledger, peers, &peer);
    }
}

/// Fetch a specific peer's full chain and attempt replacement.
pub fn sync_from(ledger: &SharedLedger, peers: &PeerDirectory, peer: &str) {
    let own_addr = GLOBAL_CONFIG.get_node_addr();
    let fetch = Package::GetChain {
        addr_from: own_addr,
    };
    let blocks = match request(peer, &fetch) {
        Ok(Package::Chain { blocks, .. }) => {
            peers.record_success(peer);
            blocks
        }
        Ok(other) => {
            warn!("Unexpected chain reply from {peer}: {other:?}");
            peers.record_failure(peer);
            return;
        }
        Err(e) => {
            warn!("Chain fetch from {peer} failed: {e}");
            peers.record_failure(peer);
            return;
        }
    };

    match ledger.write() {
        Ok(mut chain) => match chain.replace_chain(blocks) {
            Ok(true) => info!("Adopted longer chain from {peer}"),
            Ok(false) => debug!("Chain from {peer} no longer ahead, kept local chain"),
            Err(e) => warn!("Rejected chain from {peer}: {e}"),
        },
        Err(_) => {
            log::error!("Failed to acquire write lock on ledger for replacement");
        }
    }
}

/// Announce ourselves to the seed peers so they learn our address and can
/// push blocks back.
pub fn announce_to_seeds(ledger: &SharedLedger, peers: &PeerDirectory) {
    let own_addr = GLOBAL_CONFIG.get_node_addr();
    let local_length = match ledger.read() {
        Ok(chain) => chain.get_length(),
        Err(_) => return,
    };
    for peer in peers.active_peers() {
        let pkg = Package::Discover {
            addr_from: own_addr.clone(),
            chain_length: local_length,
        };
        if let Err(e) = send_package(&peer, &pkg) {
            debug!("Discover announcement to {peer} failed: {e}");
            peers.record_failure(&peer);
        }
    }
}

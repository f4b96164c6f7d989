use crate::config::GLOBAL_CONFIG;
use crate::core::miner::DEFAULT_MAX_BLOCK_TXS;
use crate::core::{BlockDisposition, ProofOfWork, SharedLedger};
use crate::error::{NodeError, Result};
use crate::network::sync::{self, Package};
use crate::network::PeerDirectory;
use crate::storage::BalanceIndex;
use log::{debug, error, info, warn};
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often the background loop re-probes peers for a longer chain.
const SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// Pause between mining attempts, so a cancelled or failed attempt does
/// not spin.
const MINING_PAUSE: Duration = Duration::from_millis(500);
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// The node's TCP front door plus its two background loops: periodic peer
/// sync, and (for miner nodes) continuous mining.
pub struct Server {
    ledger: SharedLedger,
    peers: Arc<PeerDirectory>,
    balance_index: Arc<BalanceIndex>,
    mining_cancel: Arc<AtomicBool>,
}

impl Server {
    pub fn new(ledger: SharedLedger) -> Server {
        Server {
            ledger,
            peers: Arc::new(PeerDirectory::new()),
            balance_index: Arc::new(BalanceIndex::new()),
            mining_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get_peers(&self) -> Arc<PeerDirectory> {
        Arc::clone(&self.peers)
    }

    pub fn get_balance_index(&self) -> Arc<BalanceIndex> {
        Arc::clone(&self.balance_index)
    }

    /// Bind and serve. Blocks forever on the accept loop.
    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| NodeError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Node listening on {addr}");

        let own_addr = GLOBAL_CONFIG.get_node_addr();
        for seed in GLOBAL_CONFIG.get_seed_peers() {
            self.peers.add_peer(&seed, &own_addr);
        }
        sync::announce_to_seeds(&self.ledger, &self.peers);

        self.start_sync_loop();
        BalanceIndex::spawn_refresher(Arc::clone(&self.balance_index), Arc::clone(&self.ledger));
        if GLOBAL_CONFIG.is_miner() {
            self.start_mining_loop();
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    let ledger = Arc::clone(&self.ledger);
                    let peers = Arc::clone(&self.peers);
                    let cancel = Arc::clone(&self.mining_cancel);
                    thread::spawn(move || {
                        if let Err(e) =
                            Self::handle_connection(ledger, peers, cancel, stream, peer_addr)
                        {
                            debug!("Connection from {peer_addr} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    /// Periodically probe peers and adopt any strictly longer valid chain.
    fn start_sync_loop(&self) {
        let ledger = Arc::clone(&self.ledger);
        let peers = Arc::clone(&self.peers);
        let cancel = Arc::clone(&self.mining_cancel);

        thread::spawn(move || loop {
            thread::sleep(SYNC_INTERVAL);
            let before = match ledger.read() {
                Ok(chain) => chain.get_length(),
                Err(_) => return,
            };
            sync::sync_with_peers(&ledger, &peers);
            let after = match ledger.read() {
                Ok(chain) => chain.get_length(),
                Err(_) => return,
            };
            if after != before {
                // Any in-flight nonce search targets a stale tip now
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    /// Continuous mining: assemble a candidate under a short read lock,
    /// search for the nonce with no lock held, then re-check the tip under
    /// the write lock before appending. A tip that moved mid-search makes
    /// the solved block stale; it is dropped and the pool keeps its
    /// transactions.
    fn start_mining_loop(&self) {
        let Some(mining_addr) = GLOBAL_CONFIG.get_mining_addr() else {
            warn!("Mining enabled but no mining address configured");
            return;
        };
        info!("Mining to address {mining_addr}");

        let ledger = Arc::clone(&self.ledger);
        let peers = Arc::clone(&self.peers);
        let cancel = Arc::clone(&self.mining_cancel);

        thread::spawn(move || loop {
            cancel.store(false, Ordering::Relaxed);

            let prepared = match ledger.read() {
                Ok(chain) => chain.get_miner().prepare(
                    chain.get_chain(),
                    chain.get_mempool(),
                    &mining_addr,
                    DEFAULT_MAX_BLOCK_TXS,
                ),
                Err(_) => {
                    error!("Failed to acquire read lock on ledger for mining");
                    return;
                }
            };
            let (candidate, selected) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!("Failed to assemble block candidate: {e}");
                    thread::sleep(MINING_PAUSE);
                    continue;
                }
            };

            let Some(block) = ProofOfWork::new(candidate).search(&cancel) else {
                debug!("Mining attempt cancelled, reassembling against new tip");
                continue;
            };

            let appended = match ledger.write() {
                Ok(mut chain) => {
                    if block.get_previous_hash() == chain.get_tip().get_hash() {
                        match chain.append(block.clone()) {
                            Ok(()) => {
                                chain.get_mempool().evict_many(&selected);
                                true
                            }
                            Err(e) => {
                                warn!("Failed to append mined block: {e}");
                                false
                            }
                        }
                    } else {
                        debug!("Tip moved during nonce search, dropping stale block");
                        false
                    }
                }
                Err(_) => {
                    error!("Failed to acquire write lock on ledger for mined block");
                    return;
                }
            };

            if appended {
                info!(
                    "Mined block {} ({})",
                    block.get_index(),
                    block.get_hash()
                );
                sync::broadcast_block(&peers, &block);
            }
            thread::sleep(MINING_PAUSE);
        });
    }

    fn handle_connection(
        ledger: SharedLedger,
        peers: Arc<PeerDirectory>,
        cancel: Arc<AtomicBool>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(CONNECTION_READ_TIMEOUT))
            .map_err(|e| NodeError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let packages = serde_json::Deserializer::from_reader(reader).into_iter::<Package>();

        for pkg in packages {
            let pkg = pkg.map_err(|e| {
                NodeError::Network(format!("Malformed package from {peer_addr}: {e}"))
            })?;
            debug!("Request from {peer_addr}: {pkg:?}");
            Self::process_package(&ledger, &peers, &cancel, &stream, pkg)?;
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn process_package(
        ledger: &SharedLedger,
        peers: &Arc<PeerDirectory>,
        cancel: &Arc<AtomicBool>,
        stream: &TcpStream,
        pkg: Package,
    ) -> Result<()> {
        let own_addr = GLOBAL_CONFIG.get_node_addr();
        match pkg {
            Package::GetChainStatus { addr_from } => {
                peers.add_peer(&addr_from, &own_addr);
                let chain_length = Self::read_ledger(ledger, |chain| chain.get_length())?;
                Self::reply(
                    stream,
                    &Package::ChainStatus {
                        addr_from: own_addr,
                        chain_length,
                    },
                )
            }
            Package::GetChain { addr_from } => {
                peers.add_peer(&addr_from, &own_addr);
                let blocks = Self::read_ledger(ledger, |chain| chain.get_chain().to_vec())?;
                Self::reply(
                    stream,
                    &Package::Chain {
                        addr_from: own_addr,
                        blocks,
                    },
                )
            }
            Package::Block { addr_from, block } => {
                peers.add_peer(&addr_from, &own_addr);
                let disposition = match ledger.write() {
                    Ok(mut chain) => chain.receive_block(block),
                    Err(_) => {
                        return Err(NodeError::Network(
                            "Failed to acquire write lock on ledger".to_string(),
                        ))
                    }
                };
                match disposition {
                    BlockDisposition::Appended => {
                        // The tip moved; any running nonce search is stale
                        cancel.store(true, Ordering::Relaxed);
                    }
                    BlockDisposition::NeedsSync => {
                        info!("Peer {addr_from} is ahead, starting chain sync");
                        sync::sync_from(ledger, peers, &addr_from);
                        cancel.store(true, Ordering::Relaxed);
                    }
                    BlockDisposition::Ignored => {
                        debug!("Ignored block from {addr_from}");
                    }
                }
                Ok(())
            }
            Package::Tx {
                addr_from,
                transaction,
            } => {
                peers.add_peer(&addr_from, &own_addr);
                let (accepted, tx_hash) = Self::read_ledger(ledger, |chain| {
                    chain.submit_transaction(transaction.clone())
                })?;
                if accepted {
                    info!("Accepted transaction {tx_hash} from {addr_from}");
                    sync::broadcast_tx(peers, &transaction, &addr_from);
                } else {
                    debug!("Rejected transaction {tx_hash} from {addr_from}");
                }
                Ok(())
            }
            Package::Discover {
                addr_from,
                chain_length,
            } => {
                peers.add_peer(&addr_from, &own_addr);
                let local_length = Self::read_ledger(ledger, |chain| chain.get_length())?;
                if chain_length > local_length {
                    sync::sync_from(ledger, peers, &addr_from);
                    cancel.store(true, Ordering::Relaxed);
                }
                Ok(())
            }
            // Unsolicited responses carry no work for us
            Package::ChainStatus { addr_from, .. } | Package::Chain { addr_from, .. } => {
                debug!("Ignoring unsolicited response from {addr_from}");
                Ok(())
            }
        }
    }

    fn read_ledger<T>(
        ledger: &SharedLedger,
        f: impl FnOnce(&crate::core::Blockchain) -> T,
    ) -> Result<T> {
        match ledger.read() {
            Ok(chain) => Ok(f(&chain)),
            Err(_) => Err(NodeError::Network(
                "Failed to acquire read lock on ledger".to_string(),
            )),
        }
    }

    fn reply(stream: &TcpStream, pkg: &Package) -> Result<()> {
        serde_json::to_writer(stream, pkg)
            .map_err(|e| NodeError::Network(format!("Failed to send reply: {e}")))
    }
}

use crate::core::difficulty::Schedule;
use crate::core::miner::{Miner, DEFAULT_MAX_BLOCK_TXS};
use crate::core::{Block, Transaction};
use crate::error::{NodeError, Result};
use crate::storage::persistence::{self, ChainState};
use crate::storage::Mempool;
use crate::wallet::validate_address;
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

/// Amount tolerance when matching a pool transaction against a block from
/// another node during chain replacement.
pub const MEMPOOL_CARRYOVER_EPSILON: f64 = 1e-9;

/// The ledger handle shared between the server, the miner loop, and the
/// sync loop. Single-writer discipline: state transitions take the write
/// lock; peer I/O never happens under it.
pub type SharedLedger = Arc<RwLock<Blockchain>>;

/// Outcome of a block pushed by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDisposition {
    /// Extended the local tip directly.
    Appended,
    /// From a chain further ahead than one block; a full sync is needed.
    NeedsSync,
    /// Stale, duplicate, or invalid; dropped.
    Ignored,
}

/// Snapshot of the difficulty and reward state, as reported to operators
/// and peers.
#[derive(Debug, Clone, Serialize)]
pub struct DifficultyInfo {
    pub bits: u32,
    pub target: String,
    pub reward: f64,
    pub next_halving: u64,
}

/// The chain, its pending-transaction pool, and the difficulty state,
/// bound to an on-disk data directory.
pub struct Blockchain {
    chain: Vec<Block>,
    mempool: Mempool,
    miner: Miner,
    contracts: serde_json::Map<String, serde_json::Value>,
    data_dir: PathBuf,
}

impl Blockchain {
    /// Open the ledger at `data_dir`, restoring persisted state when a
    /// state file exists and otherwise starting from a fresh genesis. The
    /// mempool always starts empty; pending transactions do not survive a
    /// restart.
    pub fn open(data_dir: &Path) -> Result<Blockchain> {
        Self::open_with_schedule(data_dir, Schedule::default())
    }

    pub fn open_with_schedule(data_dir: &Path, schedule: Schedule) -> Result<Blockchain> {
        match persistence::load_state(data_dir)? {
            Some(state) => {
                if state.chain.is_empty() {
                    return Err(NodeError::Persistence(
                        "State file contains an empty chain".to_string(),
                    ));
                }
                // On-disk state is untrusted until it validates end to end;
                // a corrupt or tampered file is a hard error, not a chain
                if !Self::validate_blocks(&state.chain) {
                    return Err(NodeError::Persistence(
                        "State file contains an invalid chain".to_string(),
                    ));
                }
                Ok(Blockchain {
                    chain: state.chain,
                    mempool: Mempool::new(),
                    miner: Miner::with_bits(schedule, state.bits),
                    contracts: state.contracts,
                    data_dir: data_dir.to_path_buf(),
                })
            }
            None => {
                let blockchain = Blockchain {
                    chain: vec![Block::genesis()],
                    mempool: Mempool::new(),
                    miner: Miner::new(schedule),
                    contracts: serde_json::Map::new(),
                    data_dir: data_dir.to_path_buf(),
                };
                blockchain.save()?;
                info!("Initialized new chain at {}", data_dir.display());
                Ok(blockchain)
            }
        }
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(RwLock::new(self))
    }

    pub fn get_tip(&self) -> &Block {
        // The chain is never empty: it is created with genesis and every
        // mutation preserves at least one block.
        &self.chain[self.chain.len() - 1]
    }

    pub fn get_length(&self) -> u64 {
        self.chain.len() as u64
    }

    pub fn get_chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn get_block_by_height(&self, height: u64) -> Option<&Block> {
        self.chain.get(height as usize)
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.chain.iter().find(|block| block.get_hash() == hash)
    }

    pub fn get_mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn get_miner(&self) -> &Miner {
        &self.miner
    }

    pub fn get_contracts(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.contracts
    }

    pub fn set_contract(&mut self, key: String, value: serde_json::Value) {
        self.contracts.insert(key, value);
        self.save_best_effort();
    }

    /// Balance of an address: total received minus total sent (amounts plus
    /// fees), computed by a full chain scan and floored at zero.
    pub fn get_balance(&self, address: &str) -> f64 {
        let mut received = 0.0;
        let mut sent = 0.0;
        for block in &self.chain {
            for tx in block.get_transactions() {
                if tx.get_recipient() == address {
                    received += tx.get_amount();
                }
                if tx.get_sender() == address {
                    sent += tx.get_amount() + tx.get_fee();
                }
            }
        }
        (received - sent).max(0.0)
    }

    /// Every transaction touching the address, oldest first.
    pub fn get_history(&self, address: &str) -> Vec<Transaction> {
        self.chain
            .iter()
            .flat_map(|block| block.get_transactions())
            .filter(|tx| tx.get_sender() == address || tx.get_recipient() == address)
            .cloned()
            .collect()
    }

    pub fn get_difficulty(&self) -> DifficultyInfo {
        let length = self.get_length();
        DifficultyInfo {
            bits: self.miner.get_bits(),
            target: self.miner.get_target().to_str_radix(16),
            reward: self.miner.reward(length),
            next_halving: self.miner.get_schedule().next_halving(length),
        }
    }

    /// Validate and append a block extending the local tip, then retarget
    /// and persist. Persistence failure is logged but does not unwind the
    /// append; the next successful save captures the full chain.
    pub fn append(&mut self, block: Block) -> Result<()> {
        if !block.validate(self.get_tip()) {
            return Err(NodeError::InvalidBlock(format!(
                "Block {} does not extend the tip",
                block.get_index()
            )));
        }
        self.chain.push(block);
        self.miner.retarget(&self.chain);
        self.save_best_effort();
        Ok(())
    }

    /// Handle a block pushed by a peer. A direct tip extension is appended
    /// and its transactions evicted from the pool; a block from further
    /// ahead signals that a full sync is needed; anything else is dropped.
    pub fn receive_block(&mut self, block: Block) -> BlockDisposition {
        let tip_index = self.get_tip().get_index();
        if block.get_previous_hash() == self.get_tip().get_hash() {
            let transactions = block.get_transactions().to_vec();
            match self.append(block) {
                Ok(()) => {
                    self.mempool.evict_many(&transactions);
                    BlockDisposition::Appended
                }
                Err(e) => {
                    warn!("Rejected peer block: {e}");
                    BlockDisposition::Ignored
                }
            }
        } else if block.get_index() > tip_index + 1 {
            BlockDisposition::NeedsSync
        } else {
            BlockDisposition::Ignored
        }
    }

    /// Verify a transaction's signature and run it through mempool
    /// admission. Returns whether it was accepted, along with its hash so
    /// the submitter can track it either way.
    pub fn submit_transaction(&self, tx: Transaction) -> (bool, String) {
        let tx_hash = tx.hash_hex();
        if !tx.verify() {
            warn!("Rejecting transaction {tx_hash}: signature verification failed");
            return (false, tx_hash);
        }
        let accepted = self.mempool.admit(tx, |address| self.get_balance(address));
        (accepted, tx_hash)
    }

    /// Mine one block onto the local tip. Returns `Ok(None)` when the
    /// cancellation flag was raised mid-search, in which case neither the
    /// chain nor the mempool changed.
    pub fn mine(&mut self, miner_address: &str, cancel: &AtomicBool) -> Result<Option<Block>> {
        if !validate_address(miner_address) {
            return Err(NodeError::InvalidAddress(miner_address.to_string()));
        }
        let mined = self.miner.mine(
            &self.chain,
            &self.mempool,
            miner_address,
            DEFAULT_MAX_BLOCK_TXS,
            cancel,
        )?;
        match mined {
            Some(block) => {
                self.append(block.clone())?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Full validation of the local chain: structural genesis plus pairwise
    /// validation of every adjacent pair.
    pub fn validate_chain(&self) -> bool {
        Self::validate_blocks(&self.chain)
    }

    /// Validate an arbitrary block sequence as a complete chain.
    pub fn validate_blocks(blocks: &[Block]) -> bool {
        match blocks.first() {
            Some(genesis) if genesis.is_valid_genesis() => {}
            _ => return false,
        }
        blocks.windows(2).all(|pair| pair[1].validate(&pair[0]))
    }

    /// Adopt a fetched chain if and only if it is strictly longer, shares
    /// our genesis, and validates end to end. All-or-nothing: any failure
    /// leaves the local chain and mempool untouched. On success, pool
    /// transactions not present in the new chain are carried over.
    pub fn replace_chain(&mut self, new_chain: Vec<Block>) -> Result<bool> {
        if new_chain.len() <= self.chain.len() {
            return Ok(false);
        }
        let shares_genesis = new_chain
            .first()
            .map(|block| block.get_hash() == self.chain[0].get_hash())
            .unwrap_or(false);
        if !shares_genesis {
            return Err(NodeError::ChainReplacement(
                "Candidate chain has a different genesis".to_string(),
            ));
        }
        if !Self::validate_blocks(&new_chain) {
            return Err(NodeError::ChainReplacement(
                "Candidate chain failed validation".to_string(),
            ));
        }

        let old_length = self.chain.len();
        let pending = self.mempool.drain();
        self.chain = new_chain;

        let mut carried = 0;
        for tx in pending {
            let confirmed = self.chain.iter().any(|block| {
                block
                    .get_transactions()
                    .iter()
                    .any(|chain_tx| chain_tx.matches_within_epsilon(&tx, MEMPOOL_CARRYOVER_EPSILON))
            });
            if !confirmed {
                self.mempool.reinsert(tx);
                carried += 1;
            }
        }

        self.miner.retarget(&self.chain);
        self.save_best_effort();
        info!(
            "Replaced chain: {} -> {} blocks, {carried} transactions carried over",
            old_length,
            self.chain.len()
        );
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        let state = ChainState {
            chain: self.chain.clone(),
            bits: self.miner.get_bits(),
            target: self.miner.get_target().to_str_radix(16),
            contracts: self.contracts.clone(),
        };
        persistence::save_state(&self.data_dir, &state)
    }

    fn save_best_effort(&self) {
        if let Err(e) = self.save() {
            error!("Failed to persist chain state: {e}");
        }
    }
}

use crate::core::difficulty::{compact_to_target, MAX_BITS};
use crate::core::merkle::{merkle_root, EMPTY_MERKLE_ROOT};
use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{current_timestamp, sha256_digest};
use data_encoding::HEXLOWER;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// 64 zero hex characters: the previous-hash of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";
/// Fixed genesis constants so that independent fresh nodes produce
/// byte-identical genesis blocks.
pub const GENESIS_TIMESTAMP: i64 = 1_718_000_000_000;
pub const GENESIS_NONCE: u64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    previous_hash: String,
    timestamp: i64,
    transactions: Vec<Transaction>,
    nonce: u64,
    bits: u32,
    merkle_root: String,
    hash: String,
}

impl Block {
    /// Assemble a candidate block linked to `prev`, nonce 0, hash computed
    /// for the initial nonce. The proof-of-work search mutates the nonce
    /// until the hash meets the target.
    pub fn assemble(prev: &Block, transactions: Vec<Transaction>, bits: u32) -> Result<Block> {
        let merkle_root = merkle_root(&transactions);
        let mut block = Block {
            index: prev.index + 1,
            previous_hash: prev.hash.clone(),
            timestamp: current_timestamp()?,
            transactions,
            nonce: 0,
            bits,
            merkle_root,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// The deterministic genesis block: fixed timestamp and nonce, no
    /// transactions, easiest difficulty.
    pub fn genesis() -> Block {
        let mut block = Block {
            index: 0,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            timestamp: GENESIS_TIMESTAMP,
            transactions: vec![],
            nonce: GENESIS_NONCE,
            bits: MAX_BITS,
            merkle_root: EMPTY_MERKLE_ROOT.to_string(),
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    fn header_bytes(&self, nonce: u64) -> Vec<u8> {
        let mut data = vec![];
        data.extend(self.index.to_be_bytes());
        data.extend(self.previous_hash.as_bytes());
        data.extend(self.timestamp.to_be_bytes());
        data.extend(self.merkle_root.as_bytes());
        data.extend(nonce.to_be_bytes());
        data.extend(self.bits.to_be_bytes());
        data
    }

    /// SHA-256 over the full header for the current nonce.
    pub fn compute_hash(&self) -> String {
        HEXLOWER.encode(&sha256_digest(&self.header_bytes(self.nonce)))
    }

    pub(crate) fn hash_for_nonce(&self, nonce: u64) -> Vec<u8> {
        sha256_digest(&self.header_bytes(nonce))
    }

    pub(crate) fn set_proof(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }

    /// The stored hash interpreted as an unsigned big integer, for
    /// comparison against the difficulty target.
    pub fn pow_value(&self) -> BigUint {
        match HEXLOWER.decode(self.hash.as_bytes()) {
            Ok(bytes) => BigUint::from_bytes_be(&bytes),
            // A non-hex hash can never satisfy any target
            Err(_) => BigUint::from_bytes_be(&[0xff; 33]),
        }
    }

    /// Full block validation against its predecessor: linkage, recomputed
    /// hash, recomputed Merkle root, and proof-of-work. Any single failure
    /// invalidates the whole block.
    pub fn validate(&self, prev: &Block) -> bool {
        if self.index != prev.index + 1 {
            return false;
        }
        if self.previous_hash != prev.hash {
            return false;
        }
        if self.compute_hash() != self.hash {
            return false;
        }
        if merkle_root(&self.transactions) != self.merkle_root {
            return false;
        }
        self.pow_value() <= compact_to_target(self.bits)
    }

    /// Genesis is validated structurally: its fixed fields and recomputed
    /// hash must match the canonical genesis block.
    pub fn is_valid_genesis(&self) -> bool {
        let canonical = Block::genesis();
        self.index == 0
            && self.previous_hash == canonical.previous_hash
            && self.timestamp == canonical.timestamp
            && self.nonce == canonical.nonce
            && self.bits == canonical.bits
            && self.transactions.is_empty()
            && self.merkle_root == canonical.merkle_root
            && self.hash == canonical.hash
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_bits(&self) -> u32 {
        self.bits
    }

    pub fn get_merkle_root(&self) -> &str {
        &self.merkle_root
    }

    pub fn get_hash(&self) -> &str {
        &self.hash
    }

    /// Create a block with a custom timestamp (for testing only)
    #[cfg(test)]
    pub(crate) fn new_test_block(
        prev: &Block,
        transactions: Vec<Transaction>,
        bits: u32,
        timestamp: i64,
    ) -> Block {
        let merkle_root = merkle_root(&transactions);
        let mut block = Block {
            index: prev.index + 1,
            previous_hash: prev.hash.clone(),
            timestamp,
            transactions,
            nonce: 0,
            bits,
            merkle_root,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }
}

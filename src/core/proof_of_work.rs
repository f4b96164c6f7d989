use crate::core::difficulty::compact_to_target;
use crate::core::Block;
use data_encoding::HEXLOWER;
use log::debug;
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};

/// The nonce search polls the cancellation flag once per this many
/// attempts, so a chain replacement observed mid-search can abort an
/// attempt against a now-stale tip.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Nonce search over a candidate block: the only unbounded loop in the
/// system, and therefore interruptible.
pub struct ProofOfWork {
    block: Block,
    target: BigUint,
}

impl ProofOfWork {
    pub fn new(block: Block) -> ProofOfWork {
        let target = compact_to_target(block.get_bits());
        ProofOfWork { block, target }
    }

    /// Increment the nonce until the header hash, read as an unsigned big
    /// integer, is at or below the target. Returns `None` if the
    /// cancellation flag was raised before a solution was found.
    pub fn search(mut self, cancel: &AtomicBool) -> Option<Block> {
        let mut nonce: u64 = 0;
        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!(
                    "Nonce search cancelled at attempt {nonce} for block {}",
                    self.block.get_index()
                );
                return None;
            }

            let digest = self.block.hash_for_nonce(nonce);
            if BigUint::from_bytes_be(&digest) <= self.target {
                self.block.set_proof(nonce, HEXLOWER.encode(&digest));
                debug!(
                    "Found nonce {nonce} for block {} ({})",
                    self.block.get_index(),
                    self.block.get_hash()
                );
                return Some(self.block);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Check a block's stored hash against the target derived from its own
    /// difficulty bits.
    pub fn meets_target(block: &Block) -> bool {
        block.pow_value() <= compact_to_target(block.get_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::difficulty::MAX_BITS;
    use crate::core::Transaction;
    use crate::wallet::Wallet;

    fn mined_block() -> Block {
        let genesis = Block::genesis();
        let miner = Wallet::new();
        let coinbase = Transaction::new_coinbase(&miner.get_address(), 50.0).unwrap();
        let candidate = Block::assemble(&genesis, vec![coinbase], MAX_BITS).unwrap();
        let cancel = AtomicBool::new(false);
        ProofOfWork::new(candidate).search(&cancel).unwrap()
    }

    #[test]
    fn test_search_finds_valid_proof() {
        let block = mined_block();
        assert!(ProofOfWork::meets_target(&block));
        assert_eq!(block.compute_hash(), block.get_hash());
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let genesis = Block::genesis();
        let miner = Wallet::new();
        let coinbase = Transaction::new_coinbase(&miner.get_address(), 50.0).unwrap();
        // A hard target so the search cannot finish before the first
        // cancellation check
        let candidate = Block::assemble(&genesis, vec![coinbase], 0x0100_0001).unwrap();

        let cancel = AtomicBool::new(true);
        assert!(ProofOfWork::new(candidate).search(&cancel).is_none());
    }

    #[test]
    fn test_tampered_proof_fails_target_check() {
        let mut block = mined_block();
        // Replace the stored hash with one that is numerically enormous
        block.set_proof(block.get_nonce(), "ff".repeat(32));
        assert!(!ProofOfWork::meets_target(&block));
    }
}

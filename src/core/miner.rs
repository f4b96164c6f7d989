use crate::core::difficulty::{compact_to_target, Schedule, MAX_BITS};
use crate::core::{Block, ProofOfWork, Transaction};
use crate::error::{NodeError, Result};
use crate::storage::Mempool;
use log::info;
use num_bigint::BigUint;
use std::sync::atomic::AtomicBool;

/// Default cap on non-coinbase transactions pulled into one block.
pub const DEFAULT_MAX_BLOCK_TXS: usize = 100;

/// Holds the difficulty state (current compact bits) and the reward
/// schedule, and drives block assembly plus the nonce search.
pub struct Miner {
    bits: u32,
    schedule: Schedule,
}

impl Miner {
    pub fn new(schedule: Schedule) -> Miner {
        Miner {
            bits: MAX_BITS,
            schedule,
        }
    }

    pub fn with_bits(schedule: Schedule, bits: u32) -> Miner {
        Miner { bits, schedule }
    }

    pub fn get_bits(&self) -> u32 {
        self.bits
    }

    pub fn get_target(&self) -> BigUint {
        compact_to_target(self.bits)
    }

    pub fn get_schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn reward(&self, chain_length: u64) -> f64 {
        self.schedule.reward(chain_length)
    }

    /// Recompute the compact bits for the next block from the chain.
    pub fn retarget(&mut self, chain: &[Block]) {
        self.bits = self.schedule.retarget(chain, self.bits);
    }

    /// Assemble a candidate block: coinbase first, then the highest-fee
    /// mempool selection, linked to the chain tip. The coinbase pays the
    /// scheduled reward plus every selected fee, so fees change hands
    /// instead of vanishing. Returns the candidate plus the selected
    /// transactions (which are NOT yet evicted from the pool).
    pub fn prepare(
        &self,
        chain: &[Block],
        mempool: &Mempool,
        miner_address: &str,
        max_tx: usize,
    ) -> Result<(Block, Vec<Transaction>)> {
        let tip = chain
            .last()
            .ok_or_else(|| NodeError::Mining("Cannot mine on an empty chain".to_string()))?;

        let reward = self.schedule.reward(chain.len() as u64);
        let selected = mempool.select(max_tx);
        let fees: f64 = selected.iter().map(|tx| tx.get_fee()).sum();
        let coinbase = Transaction::new_coinbase(miner_address, reward + fees)?;

        let mut transactions = Vec::with_capacity(selected.len() + 1);
        transactions.push(coinbase);
        transactions.extend(selected.iter().cloned());

        let candidate = Block::assemble(tip, transactions, self.bits)?;
        Ok((candidate, selected))
    }

    /// Run a full mining attempt. Mined transactions leave the mempool
    /// only after the nonce search succeeds, so a cancelled or failed mine
    /// never silently drops pool entries. The returned block still has to
    /// be appended by the ledger.
    pub fn mine(
        &self,
        chain: &[Block],
        mempool: &Mempool,
        miner_address: &str,
        max_tx: usize,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        let (candidate, selected) = self.prepare(chain, mempool, miner_address, max_tx)?;
        info!(
            "Mining block {} with {} transactions (bits {:#010x})",
            candidate.get_index(),
            candidate.get_transactions().len(),
            self.bits
        );

        match ProofOfWork::new(candidate).search(cancel) {
            Some(block) => {
                mempool.evict_many(&selected);
                info!(
                    "Mined block {} ({}) with {} transactions",
                    block.get_index(),
                    block.get_hash(),
                    block.get_transactions().len()
                );
                Ok(Some(block))
            }
            None => {
                info!("Mining attempt cancelled, mempool left untouched");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use std::sync::atomic::Ordering;

    fn easy_miner() -> Miner {
        Miner::new(Schedule::default())
    }

    #[test]
    fn test_mine_produces_valid_block_with_coinbase_first() {
        let chain = vec![Block::genesis()];
        let mempool = Mempool::new();
        let miner_wallet = Wallet::new();
        let sender = Wallet::new();

        let tx = Transaction::new_signed(&sender, &miner_wallet.get_address(), 1.0, 0.1, None)
            .unwrap();
        assert!(mempool.admit(tx, |_| 100.0));

        let miner = easy_miner();
        let cancel = AtomicBool::new(false);
        let block = miner
            .mine(
                &chain,
                &mempool,
                &miner_wallet.get_address(),
                DEFAULT_MAX_BLOCK_TXS,
                &cancel,
            )
            .unwrap()
            .expect("uncancelled mine must produce a block");

        assert!(block.validate(&chain[0]));
        assert!(block.get_transactions()[0].is_coinbase());
        assert_eq!(block.get_transactions().len(), 2);
        // The mined transaction was evicted as part of the successful mine
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_cancelled_mine_leaves_mempool_untouched() {
        let chain = vec![Block::genesis()];
        let mempool = Mempool::new();
        let miner_wallet = Wallet::new();
        let sender = Wallet::new();

        let tx = Transaction::new_signed(&sender, &miner_wallet.get_address(), 1.0, 0.1, None)
            .unwrap();
        assert!(mempool.admit(tx, |_| 100.0));

        // An effectively-impossible target forces the search to hit the
        // cancellation check
        let miner = Miner::with_bits(Schedule::default(), 0x0100_0001);
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::Relaxed);

        let result = miner
            .mine(
                &chain,
                &mempool,
                &miner_wallet.get_address(),
                DEFAULT_MAX_BLOCK_TXS,
                &cancel,
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_reward_follows_halving_schedule() {
        let schedule = Schedule {
            initial_reward: 50.0,
            halving_interval: 3,
            ..Default::default()
        };
        let miner = Miner::new(schedule);
        assert_eq!(miner.reward(1), 50.0);
        assert_eq!(miner.reward(4), 25.0);
    }
}

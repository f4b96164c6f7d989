use crate::core::Transaction;
use crate::wallet::validate_address;
use log::warn;
use std::cmp::Ordering;
use std::sync::RwLock;

/// Pending transactions awaiting inclusion in a block, kept in arrival
/// order and deduplicated by (sender, recipient, amount, timestamp).
pub struct Mempool {
    inner: RwLock<Vec<Transaction>>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Mempool {
        Mempool {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Admission policy, short-circuiting in order: malformed amounts,
    /// coinbase fast path, address checksums, available funds, duplicate
    /// identity. `balance_of` supplies the chain-derived balance; spends
    /// already pending in the pool are charged against it so the same
    /// funds cannot be promised twice.
    pub fn admit<F>(&self, tx: Transaction, balance_of: F) -> bool
    where
        F: Fn(&str) -> f64,
    {
        if !(tx.get_amount() >= 0.0 && tx.get_amount().is_finite())
            || !(tx.get_fee() >= 0.0 && tx.get_fee().is_finite())
        {
            warn!("Rejecting malformed transaction (negative or non-finite amount/fee)");
            return false;
        }

        let mut pool = match self.inner.write() {
            Ok(pool) => pool,
            Err(_) => {
                log::error!("Failed to acquire write lock on mempool");
                return false;
            }
        };

        if tx.is_coinbase() {
            pool.push(tx);
            return true;
        }

        if !validate_address(tx.get_sender()) || !validate_address(tx.get_recipient()) {
            warn!("Rejecting transaction with invalid address format");
            return false;
        }

        let pending_spend: f64 = pool
            .iter()
            .filter(|pending| pending.get_sender() == tx.get_sender())
            .map(|pending| pending.get_amount() + pending.get_fee())
            .sum();
        let required = tx.get_amount() + tx.get_fee();
        let available = balance_of(tx.get_sender()) - pending_spend;
        if available < required {
            warn!(
                "Rejecting transaction from {}: required {required}, available {available}",
                tx.get_sender()
            );
            return false;
        }

        if pool.iter().any(|pending| pending.same_identity(&tx)) {
            warn!("Rejecting duplicate transaction from {}", tx.get_sender());
            return false;
        }

        pool.push(tx);
        true
    }

    /// Highest-fee transactions first, truncated to `limit`. The sort is
    /// stable, so fee ties keep arrival order.
    pub fn select(&self, limit: usize) -> Vec<Transaction> {
        let mut selected = match self.inner.read() {
            Ok(pool) => pool.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                return Vec::new();
            }
        };
        selected.sort_by(|a, b| {
            b.get_fee()
                .partial_cmp(&a.get_fee())
                .unwrap_or(Ordering::Equal)
        });
        selected.truncate(limit);
        selected
    }

    /// Remove the exact transaction if present; a no-op when absent, which
    /// accommodates races with peer-driven chain replacement evicting the
    /// same transactions concurrently.
    pub fn evict(&self, tx: &Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                if let Some(idx) = pool.iter().position(|pending| pending.same_identity(tx)) {
                    pool.remove(idx);
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on mempool");
            }
        }
    }

    pub fn evict_many(&self, txs: &[Transaction]) {
        for tx in txs {
            self.evict(tx);
        }
    }

    pub fn contains(&self, tx: &Transaction) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.iter().any(|pending| pending.same_identity(tx)),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                false
            }
        }
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                Vec::new()
            }
        }
    }

    /// Take every pending transaction out of the pool, leaving it empty.
    /// Used by chain replacement to carry transactions across the swap.
    pub fn drain(&self) -> Vec<Transaction> {
        match self.inner.write() {
            Ok(mut pool) => std::mem::take(&mut *pool),
            Err(_) => {
                log::error!("Failed to acquire write lock on mempool");
                Vec::new()
            }
        }
    }

    /// Re-insert a transaction without re-running admission. Only used for
    /// carry-over during chain replacement, where the transaction was
    /// already admitted once.
    pub fn reinsert(&self, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => pool.push(tx),
            Err(_) => {
                log::error!("Failed to acquire write lock on mempool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on mempool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => pool.clear(),
            Err(_) => {
                log::error!("Failed to acquire write lock on mempool");
            }
        }
    }
}

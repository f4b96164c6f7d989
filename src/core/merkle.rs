use crate::core::Transaction;
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;

/// Merkle root of an empty transaction list (the genesis block has no
/// transactions).
pub const EMPTY_MERKLE_ROOT: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the Merkle root over the ordered transaction hashes.
///
/// Leaves are raw 32-byte transaction hashes; each level pairs neighbours
/// as SHA256(left ‖ right), duplicating the last node when a level has an
/// odd count.
pub fn merkle_root(transactions: &[Transaction]) -> String {
    let leaves: Vec<Vec<u8>> = transactions.iter().map(|tx| tx.hash_raw()).collect();
    merkle_root_from_hashes(&leaves)
}

pub fn merkle_root_from_hashes(leaves: &[Vec<u8>]) -> String {
    if leaves.is_empty() {
        return EMPTY_MERKLE_ROOT.to_string();
    }

    let mut level: Vec<Vec<u8>> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            // Duplicate the odd node to balance the tree
            let last = level
                .last()
                .expect("Level is non-empty inside the reduction loop")
                .clone();
            level.push(last);
        }

        level = level
            .chunks(2)
            .map(|pair| {
                let mut concat = pair[0].clone();
                concat.extend_from_slice(&pair[1]);
                sha256_digest(&concat)
            })
            .collect();
    }

    HEXLOWER.encode(&level[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Transaction;
    use crate::wallet::Wallet;

    fn sample_txs(n: usize) -> Vec<Transaction> {
        let miner = Wallet::new();
        (0..n)
            .map(|i| {
                Transaction::new_coinbase_with_timestamp(&miner.get_address(), 50.0, i as i64)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_empty_list_has_zero_root() {
        assert_eq!(merkle_root(&[]), EMPTY_MERKLE_ROOT);
    }

    #[test]
    fn test_single_transaction_root_is_its_hash() {
        let txs = sample_txs(1);
        assert_eq!(merkle_root(&txs), txs[0].hash_hex());
    }

    #[test]
    fn test_odd_count_duplicates_last_node() {
        let txs = sample_txs(3);
        let padded: Vec<Vec<u8>> = vec![
            txs[0].hash_raw(),
            txs[1].hash_raw(),
            txs[2].hash_raw(),
            txs[2].hash_raw(),
        ];
        assert_eq!(merkle_root(&txs), merkle_root_from_hashes(&padded));
    }

    #[test]
    fn test_root_depends_on_transaction_order() {
        let txs = sample_txs(4);
        let mut reversed = txs.clone();
        reversed.reverse();
        assert_ne!(merkle_root(&txs), merkle_root(&reversed));
    }

    #[test]
    fn test_root_changes_with_any_transaction() {
        let txs = sample_txs(4);
        let mut altered = txs.clone();
        altered[2].tamper_amount(49.0);
        assert_ne!(merkle_root(&txs), merkle_root(&altered));
    }
}

use converge_chain::{Blockchain, Schedule, Transaction, Wallet};
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

fn mine_one(chain: &mut Blockchain, miner: &Wallet) {
    let cancel = AtomicBool::new(false);
    chain
        .mine(&miner.get_address(), &cancel)
        .unwrap()
        .expect("uncancelled mine must produce a block");
}

#[test]
fn test_fresh_nodes_agree_on_genesis() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();

    let a = Blockchain::open(dir_a.path()).unwrap();
    let b = Blockchain::open(dir_b.path()).unwrap();

    assert_eq!(a.get_tip().get_hash(), b.get_tip().get_hash());
    assert!(a.get_tip().is_valid_genesis());
}

#[test]
fn test_reward_halves_on_height_schedule() {
    let dir = tempdir().unwrap();
    let schedule = Schedule {
        initial_reward: 50.0,
        halving_interval: 3,
        ..Default::default()
    };
    let mut chain = Blockchain::open_with_schedule(dir.path(), schedule).unwrap();
    let miner = Wallet::new();

    // Heights 1 and 2 pay 50; the block mined at chain length 3 pays 25
    mine_one(&mut chain, &miner);
    mine_one(&mut chain, &miner);
    assert_eq!(chain.get_balance(&miner.get_address()), 100.0);

    mine_one(&mut chain, &miner);
    assert_eq!(chain.get_balance(&miner.get_address()), 125.0);

    // The difficulty report exposes the same schedule
    let info = chain.get_difficulty();
    assert_eq!(info.reward, 25.0);
    assert_eq!(info.next_halving, 6);
}

#[test]
fn test_double_spend_cannot_enter_the_pool() {
    let dir = tempdir().unwrap();
    let mut chain = Blockchain::open(dir.path()).unwrap();
    let alice = Wallet::new();
    let bob = Wallet::new();

    mine_one(&mut chain, &alice);
    assert_eq!(chain.get_balance(&alice.get_address()), 50.0);

    // Two transfers that are individually funded but not jointly
    let first = Transaction::new_signed(&alice, &bob.get_address(), 30.0, 0.0, None).unwrap();
    let second = Transaction::new_signed(&alice, &bob.get_address(), 30.0, 0.0, None).unwrap();

    assert!(chain.submit_transaction(first).0);
    assert!(!chain.submit_transaction(second).0);
    assert_eq!(chain.get_mempool().len(), 1);
}

#[test]
fn test_fees_order_block_inclusion() {
    let dir = tempdir().unwrap();
    let mut chain = Blockchain::open(dir.path()).unwrap();
    let alice = Wallet::new();
    let bob = Wallet::new();

    mine_one(&mut chain, &alice);

    let low = Transaction::new_signed(&alice, &bob.get_address(), 1.0, 0.1, None).unwrap();
    let high = Transaction::new_signed(&alice, &bob.get_address(), 1.0, 0.9, None).unwrap();
    assert!(chain.submit_transaction(low).0);
    assert!(chain.submit_transaction(high).0);

    mine_one(&mut chain, &bob);
    let block = chain.get_tip();
    let txs = block.get_transactions();

    // Coinbase first, then the selection in fee-descending order
    assert!(txs[0].is_coinbase());
    assert_eq!(txs[1].get_fee(), 0.9);
    assert_eq!(txs[2].get_fee(), 0.1);
}

#[test]
fn test_value_is_conserved_across_transfers() {
    let dir = tempdir().unwrap();
    let mut chain = Blockchain::open(dir.path()).unwrap();
    let alice = Wallet::new();
    let bob = Wallet::new();
    let carol = Wallet::new();

    mine_one(&mut chain, &alice);
    mine_one(&mut chain, &alice);

    let tx = Transaction::new_signed(&alice, &bob.get_address(), 25.0, 1.0, None).unwrap();
    assert!(chain.submit_transaction(tx).0);
    mine_one(&mut chain, &carol);

    let total = chain.get_balance(&alice.get_address())
        + chain.get_balance(&bob.get_address())
        + chain.get_balance(&carol.get_address());
    // Everything in circulation came from the three coinbase rewards; the
    // fee moved between holders without being destroyed
    assert!((total - 150.0).abs() < 1e-9);
}

#[test]
fn test_chain_survives_restart() {
    let dir = tempdir().unwrap();
    let miner = Wallet::new();
    let recipient = Wallet::new();

    let tip_hash = {
        let mut chain = Blockchain::open(dir.path()).unwrap();
        mine_one(&mut chain, &miner);

        // A pending transaction that must NOT survive the restart
        let tx =
            Transaction::new_signed(&miner, &recipient.get_address(), 1.0, 0.0, None).unwrap();
        assert!(chain.submit_transaction(tx).0);
        chain.get_tip().get_hash().to_string()
    };

    let reopened = Blockchain::open(dir.path()).unwrap();
    assert_eq!(reopened.get_length(), 2);
    assert_eq!(reopened.get_tip().get_hash(), tip_hash);
    assert!(reopened.validate_chain());
    assert!(reopened.get_mempool().is_empty());
    assert_eq!(reopened.get_balance(&miner.get_address()), 50.0);
}

#[test]
fn test_longer_valid_chain_wins_and_pool_is_retained() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let miner_a = Wallet::new();
    let miner_b = Wallet::new();
    let recipient = Wallet::new();

    let mut local = Blockchain::open(dir_a.path()).unwrap();
    for _ in 0..3 {
        mine_one(&mut local, &miner_a);
    }

    // A transfer pending locally, unknown to the other chain
    let tx = Transaction::new_signed(&miner_a, &recipient.get_address(), 2.0, 0.1, None).unwrap();
    assert!(local.submit_transaction(tx).0);

    let mut other = Blockchain::open(dir_b.path()).unwrap();
    for _ in 0..10 {
        mine_one(&mut other, &miner_b);
    }

    assert!(local.replace_chain(other.get_chain().to_vec()).unwrap());
    assert_eq!(local.get_length(), 11);
    assert!(local.validate_chain());
    // The pending transfer outlived the reorganization
    assert_eq!(local.get_mempool().len(), 1);
    // Balances now reflect the adopted history
    assert_eq!(local.get_balance(&miner_a.get_address()), 0.0);
    assert_eq!(local.get_balance(&miner_b.get_address()), 500.0);
}

#[test]
fn test_shorter_chain_never_replaces_longer() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let miner = Wallet::new();

    let mut local = Blockchain::open(dir_a.path()).unwrap();
    for _ in 0..10 {
        mine_one(&mut local, &miner);
    }
    let tip_before = local.get_tip().get_hash().to_string();

    let mut other = Blockchain::open(dir_b.path()).unwrap();
    for _ in 0..3 {
        mine_one(&mut other, &miner);
    }

    assert!(!local.replace_chain(other.get_chain().to_vec()).unwrap());
    assert_eq!(local.get_length(), 11);
    assert_eq!(local.get_tip().get_hash(), tip_before);
}

#[test]
fn test_cancelled_mining_changes_nothing() {
    let dir = tempdir().unwrap();
    let mut chain = Blockchain::open(dir.path()).unwrap();
    let alice = Wallet::new();
    let bob = Wallet::new();

    mine_one(&mut chain, &alice);
    let tx = Transaction::new_signed(&alice, &bob.get_address(), 1.0, 0.1, None).unwrap();
    assert!(chain.submit_transaction(tx).0);

    // The search polls the flag before the first attempt, so a pre-raised
    // flag always cancels
    let cancel = AtomicBool::new(true);
    let result = chain.mine(&bob.get_address(), &cancel).unwrap();

    assert!(result.is_none());
    assert_eq!(chain.get_length(), 2);
    assert_eq!(chain.get_mempool().len(), 1);
}

#[test]
fn test_mined_blocks_validate_end_to_end() {
    let dir = tempdir().unwrap();
    let mut chain = Blockchain::open(dir.path()).unwrap();
    let alice = Wallet::new();
    let bob = Wallet::new();

    mine_one(&mut chain, &alice);
    let tx = Transaction::new_signed(&alice, &bob.get_address(), 5.0, 0.5, None).unwrap();
    assert!(chain.submit_transaction(tx).0);
    mine_one(&mut chain, &bob);

    assert!(chain.validate_chain());
    // Every non-genesis block carries its coinbase first
    for block in &chain.get_chain()[1..] {
        assert!(block.get_transactions()[0].is_coinbase());
    }
    // Block lookups agree with the chain
    let tip = chain.get_tip().get_hash().to_string();
    assert_eq!(
        chain.get_block_by_hash(&tip).unwrap().get_index(),
        chain.get_length() - 1
    );
    assert_eq!(
        chain
            .get_block_by_height(chain.get_length() - 1)
            .unwrap()
            .get_hash(),
        tip
    );
}

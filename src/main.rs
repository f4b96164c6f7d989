use clap::Parser;
use converge_chain::network::sync;
use converge_chain::{
    validate_address, Blockchain, Command, Opt, Package, Server, Transaction, Wallets,
    GLOBAL_CONFIG,
};
use log::{error, LevelFilter};
use std::process;
use std::sync::atomic::AtomicBool;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn open_ledger() -> Result<Blockchain, Box<dyn std::error::Error>> {
    Ok(Blockchain::open(&GLOBAL_CONFIG.get_data_dir())?)
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createwallet => {
            let mut wallets = Wallets::new();
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new();
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let chain = open_ledger()?;
            println!("Balance of {address}: {}", chain.get_balance(&address));
        }
        Command::History { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let chain = open_ledger()?;
            for tx in chain.get_history(&address) {
                println!(
                    "{}  {} -> {}  amount={} fee={}",
                    tx.hash_hex(),
                    tx.get_sender(),
                    tx.get_recipient(),
                    tx.get_amount(),
                    tx.get_fee()
                );
            }
        }
        Command::Send {
            from,
            to,
            amount,
            fee,
            mine,
        } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            if amount <= 0.0 {
                return Err("Amount must be positive".into());
            }

            let wallets = Wallets::new();
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No local wallet for address {from}"))?;
            let transaction = Transaction::new_signed(wallet, &to, amount, fee, None)?;
            let tx_hash = transaction.hash_hex();

            if mine {
                // Submit and confirm locally in one step
                let mut chain = open_ledger()?;
                let (accepted, _) = chain.submit_transaction(transaction);
                if !accepted {
                    return Err("Transaction rejected by the mempool".into());
                }
                let cancel = AtomicBool::new(false);
                chain
                    .mine(&from, &cancel)?
                    .ok_or("Mining was cancelled unexpectedly")?;
                println!("Transaction {tx_hash} mined into the chain");
            } else {
                // Hand the transaction to the running node
                let node_addr = GLOBAL_CONFIG.get_node_addr();
                let pkg = Package::Tx {
                    addr_from: node_addr.clone(),
                    transaction,
                };
                sync::send_package(&node_addr, &pkg)?;
                println!("Transaction {tx_hash} submitted to {node_addr}");
            }
        }
        Command::Mine { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid miner address: {address}").into());
            }
            let mut chain = open_ledger()?;
            let cancel = AtomicBool::new(false);
            let block = chain
                .mine(&address, &cancel)?
                .ok_or("Mining was cancelled unexpectedly")?;
            println!(
                "Mined block {} ({}) with {} transactions",
                block.get_index(),
                block.get_hash(),
                block.get_transactions().len()
            );
        }
        Command::Printchain => {
            let chain = open_ledger()?;
            for block in chain.get_chain() {
                println!("Block {}: {}", block.get_index(), block.get_hash());
                println!("  Previous: {}", block.get_previous_hash());
                println!("  Timestamp: {}", block.get_timestamp());
                println!("  Bits: {:#010x}  Nonce: {}", block.get_bits(), block.get_nonce());
                println!("  Merkle root: {}", block.get_merkle_root());
                for tx in block.get_transactions() {
                    println!(
                        "  - {}  {} -> {}  amount={} fee={}",
                        tx.hash_hex(),
                        tx.get_sender(),
                        tx.get_recipient(),
                        tx.get_amount(),
                        tx.get_fee()
                    );
                }
                println!();
            }
        }
        Command::Mempool => {
            let chain = open_ledger()?;
            let pending = chain.get_mempool().get_all();
            println!("{} pending transactions", pending.len());
            for tx in pending {
                println!(
                    "{}  {} -> {}  amount={} fee={}",
                    tx.hash_hex(),
                    tx.get_sender(),
                    tx.get_recipient(),
                    tx.get_amount(),
                    tx.get_fee()
                );
            }
        }
        Command::Difficulty => {
            let chain = open_ledger()?;
            let info = chain.get_difficulty();
            println!("Bits: {:#010x}", info.bits);
            println!("Target: {}", info.target);
            println!("Reward: {}", info.reward);
            println!("Next halving at height: {}", info.next_halving);
        }
        Command::Validate => {
            let chain = open_ledger()?;
            if chain.validate_chain() {
                println!("Chain is valid ({} blocks)", chain.get_length());
            } else {
                return Err("Chain validation failed".into());
            }
        }
        Command::StartNode { miner } => {
            if let Some(address) = miner {
                if !validate_address(&address) {
                    return Err(format!("Invalid miner address: {address}").into());
                }
                println!("Mining is on. Address to receive rewards: {address}");
                GLOBAL_CONFIG.set_mining_addr(address);
            }

            let socket_addr = GLOBAL_CONFIG.get_node_addr();
            let ledger = open_ledger()?.into_shared();
            let server = Server::new(ledger);
            server
                .run(&socket_addr)
                .map_err(|e| format!("Server error: {e}"))?;
        }
    }
    Ok(())
}

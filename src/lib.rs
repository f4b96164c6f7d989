//! # Converge Chain
//!
//! A peer-run ledger node: proof-of-work blocks over an account-balance
//! transaction model, with longest-chain sync between peers.
//!
//! ## What's Here
//! - **Ledger**: blocks with Merkle roots, compact-bits difficulty, and
//!   a coinbase reward that halves on a fixed height schedule
//! - **Transactions**: secp256k1-signed transfers between Base58Check
//!   addresses, ordered by fee in the pending pool
//! - **Networking**: JSON packages over TCP; peers probe chain lengths
//!   and adopt strictly longer valid chains
//! - **Persistence**: one JSON state file per data directory, with
//!   timestamped backups on every overwrite
//!
//! ## Layout
//! - `core/`: blocks, transactions, difficulty, mining, the chain itself
//! - `wallet/`: key pairs, addresses, the wallet file
//! - `network/`: peer directory, wire protocol, the TCP server
//! - `storage/`: mempool, state persistence, the balance index cache
//! - `config/`: process configuration from environment variables
//! - `utils/`: hashing, signing, Base58, timestamps
//! - `cli/`: command definitions for the binary

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, BlockDisposition, Blockchain, DifficultyInfo, Miner, ProofOfWork, Schedule,
    SharedLedger, Transaction, TxType, COINBASE_SENDER,
};
pub use error::{NodeError, Result};
pub use network::{Package, Peer, PeerDirectory, Server};
pub use storage::{AddressActivity, BalanceIndex, ChainState, Mempool};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_secp256k1_sign_digest,
    ecdsa_secp256k1_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    derive_address, hash_pub_key, validate_address, Wallet, Wallets, ADDRESS_CHECK_SUM_LEN,
};

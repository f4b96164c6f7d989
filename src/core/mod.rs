pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod merkle;
pub mod miner;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{BlockDisposition, Blockchain, DifficultyInfo, SharedLedger};
pub use difficulty::Schedule;
pub use miner::Miner;
pub use proof_of_work::ProofOfWork;
pub use transaction::{Transaction, TxType, COINBASE_SENDER};

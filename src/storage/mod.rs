pub mod balance_index;
pub mod mempool;
pub mod persistence;

pub use balance_index::{AddressActivity, BalanceIndex};
pub use mempool::Mempool;
pub use persistence::ChainState;

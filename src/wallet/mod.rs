//! Wallet management and address derivation
//!
//! Wallets hold secp256k1 key pairs; addresses are version-prefixed
//! base58-encoded public key hashes with a 4-byte checksum.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    derive_address, hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN,
    ADDRESS_PAYLOAD_LEN,
};
pub use wallets::{Wallets, WALLET_FILE};

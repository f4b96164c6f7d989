//! Utility functions and helpers
//!
//! Cryptographic primitives, encoding helpers, and timestamps used
//! throughout the node.

pub mod crypto;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_secp256k1_sign_digest,
    ecdsa_secp256k1_verify, new_key_pair, ripemd160_digest, sha256_digest,
};

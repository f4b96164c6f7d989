use crate::error::Result;
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
/// version byte + RIPEMD160 hash + checksum
pub const ADDRESS_PAYLOAD_LEN: usize = 25;

#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    secret_key: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Wallet {
        let (secret_key, public_key) = crate::utils::new_key_pair();
        Wallet {
            secret_key,
            public_key,
        }
    }

    pub fn get_address(&self) -> String {
        derive_address(self.public_key.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_secret_key(&self) -> &[u8] {
        self.secret_key.as_slice()
    }

    /// Sign a 32-byte digest with this wallet's key (DER-encoded ECDSA).
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        crate::utils::ecdsa_secp256k1_sign_digest(self.secret_key.as_slice(), digest)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Derive the base58 address for a public key:
/// version + RIPEMD160(SHA256(pub_key)) + first 4 bytes of double-SHA256.
pub fn derive_address(pub_key: &[u8]) -> String {
    let pub_key_hash = hash_pub_key(pub_key);
    let mut payload: Vec<u8> = vec![];
    payload.push(VERSION);
    payload.extend(pub_key_hash.as_slice());
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

/// The sole address-format validity check used before balance and signature
/// lookups: the payload must decode to exactly 25 bytes and the checksum
/// must verify.
pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() != ADDRESS_PAYLOAD_LEN {
        return false;
    }

    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let versioned_hash = &payload[..payload.len() - ADDRESS_CHECK_SUM_LEN];
    let target_checksum = checksum(versioned_hash);
    actual_checksum.eq(target_checksum.as_slice())
}

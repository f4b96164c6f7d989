use once_cell::sync::Lazy;
use ring::digest::{Context, SHA256};
use ripemd::{Digest as RipemdDigest, Ripemd160};
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::{NodeError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NodeError::Crypto(format!("System time error: {e}")))?
        .as_millis();

    // Ensure the timestamp fits in i64
    if duration > i64::MAX as u128 {
        return Err(NodeError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| NodeError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

/// Generate a fresh secp256k1 key pair, returned as
/// (32-byte secret key, 33-byte compressed public key).
pub fn new_key_pair() -> (Vec<u8>, Vec<u8>) {
    let (secret_key, public_key) = SECP.generate_keypair(&mut rand::thread_rng());
    (
        secret_key.secret_bytes().to_vec(),
        public_key.serialize().to_vec(),
    )
}

/// Sign a 32-byte digest with ECDSA over secp256k1, DER-encoded output.
pub fn ecdsa_secp256k1_sign_digest(secret_key: &[u8], digest: &[u8]) -> Result<Vec<u8>> {
    let secret_key = SecretKey::from_slice(secret_key)
        .map_err(|e| NodeError::Crypto(format!("Invalid secret key: {e}")))?;
    let message = Message::from_digest_slice(digest)
        .map_err(|e| NodeError::Crypto(format!("Invalid message digest: {e}")))?;
    Ok(SECP
        .sign_ecdsa(&message, &secret_key)
        .serialize_der()
        .to_vec())
}

/// Verify a DER-encoded secp256k1 signature over a 32-byte digest.
///
/// Fails closed: any decoding error counts as an invalid signature.
pub fn ecdsa_secp256k1_verify(public_key: &[u8], signature: &[u8], digest: &[u8]) -> bool {
    let public_key = match PublicKey::from_slice(public_key) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_der(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    SECP.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

//! Identifier and nonce derivation.
//!
//! Every derived value is `Blake2b-256(domain || seed || len-prefixed parts)`.
//! Length prefixes keep `("ab", "c")` and `("a", "bc")` from colliding.

use crate::hash::blake2b_256_multi;
use trustgate_types::{BlockSeed, Hash256};

/// Domain tag mixed into nonce hashes before they enter the used-nonce set.
const NONCE_HASH_DOMAIN: &[u8] = b"trustgate/nonce-hash/v1";
const NONCE_DOMAIN: &[u8] = b"trustgate/nonce/v1";

/// Bytes of a derived identifier before hex encoding.
const ID_BYTES: usize = 16;

/// Inputs to a derivation, hashed in order.
#[derive(Clone, Debug, Default)]
pub struct DerivationInput<'a> {
    parts: Vec<&'a [u8]>,
}

impl<'a> DerivationInput<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: &'a [u8]) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_str(self, part: &'a str) -> Self {
        self.with(part.as_bytes())
    }

    fn digest(&self, domain: &[u8], seed: &BlockSeed) -> [u8; 32] {
        let lengths: Vec<[u8; 8]> = self
            .parts
            .iter()
            .map(|p| (p.len() as u64).to_be_bytes())
            .collect();
        let mut chunks: Vec<&[u8]> = Vec::with_capacity(2 + self.parts.len() * 2);
        chunks.push(domain);
        chunks.push(seed.as_bytes());
        for (len, part) in lengths.iter().zip(&self.parts) {
            chunks.push(len);
            chunks.push(*part);
        }
        blake2b_256_multi(&chunks)
    }
}

/// Derive a 32-character hex identifier (`request`, `fallback`, `challenge`, `event`, ...).
pub fn derive_id(domain: &str, seed: &BlockSeed, input: &DerivationInput<'_>) -> String {
    let digest = input.digest(domain.as_bytes(), seed);
    hex::encode(&digest[..ID_BYTES])
}

/// Derive the secret nonce of a challenge.
pub fn derive_nonce(seed: &BlockSeed, input: &DerivationInput<'_>) -> String {
    hex::encode(input.digest(NONCE_DOMAIN, seed))
}

/// Hash a nonce for the used-nonce set. The set never stores nonces in the clear.
pub fn hash_nonce(nonce: &str) -> Hash256 {
    Hash256::new(blake2b_256_multi(&[NONCE_HASH_DOMAIN, nonce.as_bytes()]))
}

//! Blake2b-256, the only digest the engine uses.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Digest of the parts fed back to back, with no separator.
///
/// Mixing variable-length inputs needs length prefixes; see [`crate::derive`].
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let digest = parts
        .iter()
        .fold(Blake2b256::new(), |hasher, part| hasher.chain_update(part))
        .finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_hash_like_their_concatenation() {
        assert_eq!(
            blake2b_256(b"acct_1kyc.basic"),
            blake2b_256_multi(&[b"acct_1", b"kyc.basic"])
        );
    }

    #[test]
    fn distinct_inputs_distinct_digests() {
        assert_ne!(blake2b_256(b"sms"), blake2b_256(b"email"));
        assert_ne!(blake2b_256(b""), [0u8; 32]);
    }
}

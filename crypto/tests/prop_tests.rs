use proptest::prelude::*;
use trustgate_crypto::{derive_id, derive_nonce, hash_nonce, hash_phone, DerivationInput};
use trustgate_types::BlockSeed;

proptest! {
    /// Splitting the same bytes differently never yields the same identifier.
    #[test]
    fn part_boundaries_matter(bytes in prop::collection::vec(any::<u8>(), 2..64), split in 1usize..63) {
        prop_assume!(split < bytes.len());
        let seed = BlockSeed::new([9; 32]);
        let whole = DerivationInput::new().with(&bytes);
        let halves = DerivationInput::new().with(&bytes[..split]).with(&bytes[split..]);
        prop_assert_ne!(derive_id("request", &seed, &whole), derive_id("request", &seed, &halves));
    }

    /// Same seed and inputs give the same nonce; a different seed gives another.
    #[test]
    fn nonces_follow_the_seed(a in prop::array::uniform32(any::<u8>()), b in prop::array::uniform32(any::<u8>()), account in "[a-z_0-9]{1,24}") {
        let input = DerivationInput::new().with_str(&account);
        let first = derive_nonce(&BlockSeed::new(a), &input);
        prop_assert_eq!(&first, &derive_nonce(&BlockSeed::new(a), &input));
        prop_assert_eq!(first.len(), 64);
        if a != b {
            prop_assert_ne!(first, derive_nonce(&BlockSeed::new(b), &input));
        }
    }

    /// Nonce hashing is deterministic and sensitive to every character.
    #[test]
    fn nonce_hash_is_stable(nonce in "[0-9a-f]{64}") {
        prop_assert_eq!(hash_nonce(&nonce), hash_nonce(&nonce));
        prop_assert_ne!(hash_nonce(&nonce), hash_nonce(&format!("{nonce}0")));
    }

    /// Spaces, dashes and parentheses around the digits do not change the phone hash.
    #[test]
    fn phone_hash_ignores_punctuation(digits in "[0-9]{7,14}") {
        let plain = format!("+{digits}");
        let dressed = format!("+{} ({}) {}-{}", &digits[..1], &digits[1..4], &digits[4..6], &digits[6..]);
        prop_assert_eq!(hash_phone(&plain), hash_phone(&dressed));
    }
}

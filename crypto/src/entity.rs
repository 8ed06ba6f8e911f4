//! Hashing of rate-limited entities.
//!
//! Phone numbers, emails and IP addresses are normalised and hashed before they
//! reach a rate-limit state key, so the caller's store never holds them in the clear.

use crate::hash::blake2b_256_multi;
use trustgate_types::Hash256;

/// Hash an entity under a kind tag. Different kinds never collide.
pub fn hash_entity(kind: &str, raw: &str) -> Hash256 {
    Hash256::new(blake2b_256_multi(&[
        b"trustgate/entity/v1/",
        kind.as_bytes(),
        b"/",
        raw.as_bytes(),
    ]))
}

/// Hash a phone number. Formatting characters are stripped so
/// `+1 (555) 010-0000` and `+15550100000` hash identically.
pub fn hash_phone(phone: &str) -> Hash256 {
    let digits: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    hash_entity("phone", &digits)
}

/// Hash an email address, case-insensitively.
pub fn hash_email(email: &str) -> Hash256 {
    hash_entity("email", &email.trim().to_ascii_lowercase())
}

/// Hash an IP address in its textual form.
pub fn hash_ip(ip: &str) -> Hash256 {
    hash_entity("ip", ip.trim())
}

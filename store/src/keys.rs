//! Key layout for every key domain.
//!
//! Keys are `prefix ++ components`. Variable-length components are written
//! with a big-endian `u16` length so one account's keys never prefix
//! another's. Heights and timestamps are big-endian so index scans come back
//! in numeric order; heights have their sign bit flipped for the same reason.

use trustgate_ratelimit::EntityKind;
use trustgate_types::{AccountAddress, BlockHeight, Hash256, ScopeId, Timestamp};
use trustgate_verification::KeyPrefixes;

#[derive(Clone, Debug)]
pub struct KeySpace {
    prefixes: KeyPrefixes,
}

impl KeySpace {
    pub fn new(prefixes: KeyPrefixes) -> Self {
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &KeyPrefixes {
        &self.prefixes
    }

    pub fn request(&self, request_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.request).str(request_id).build()
    }

    pub fn request_by_account(&self, account: &AccountAddress, request_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.request_by_account)
            .str(account.as_str())
            .str(request_id)
            .build()
    }

    pub fn requests_of_account(&self, account: &AccountAddress) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.request_by_account)
            .str(account.as_str())
            .build()
    }

    pub fn pending_request(&self, height: BlockHeight, request_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.pending_request_by_height)
            .height(height)
            .str(request_id)
            .build()
    }

    /// Lowest key of the pending-request index at or above `height`.
    pub fn pending_request_floor(&self, height: BlockHeight) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.pending_request_by_height)
            .height(height)
            .build()
    }

    pub fn fallback(&self, fallback_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.fallback).str(fallback_id).build()
    }

    pub fn fallback_by_account(&self, account: &AccountAddress, fallback_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.fallback_by_account)
            .str(account.as_str())
            .str(fallback_id)
            .build()
    }

    pub fn fallbacks_of_account(&self, account: &AccountAddress) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.fallback_by_account)
            .str(account.as_str())
            .build()
    }

    pub fn pending_fallback(&self, expires_at: Timestamp, fallback_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.pending_fallback_by_expiry)
            .timestamp(expires_at)
            .str(fallback_id)
            .build()
    }

    pub fn pending_fallback_floor(&self, expires_at: Timestamp) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.pending_fallback_by_expiry)
            .timestamp(expires_at)
            .build()
    }

    pub fn rate_limit(&self, kind: EntityKind, entity_hash: &Hash256) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.rate_limit)
            .str(kind.as_str())
            .bytes(entity_hash.as_bytes())
            .build()
    }

    pub fn global_rate_limit(&self) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.global_rate_limit).build()
    }

    pub fn challenge(&self, challenge_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.challenge).str(challenge_id).build()
    }

    pub fn scope(&self, account: &AccountAddress, scope_id: &ScopeId) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.scope)
            .str(account.as_str())
            .str(scope_id.as_str())
            .build()
    }

    pub fn scopes_of_account(&self, account: &AccountAddress) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.scope).str(account.as_str()).build()
    }

    pub fn case(&self, request_id: &str) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.case).str(request_id).build()
    }

    pub fn used_nonce(&self, nonce_hash: &Hash256) -> Vec<u8> {
        KeyBuilder::new(&self.prefixes.used_nonce)
            .bytes(nonce_hash.as_bytes())
            .build()
    }
}

/// Maps a signed height onto `u64` preserving order.
fn ordered_height(height: BlockHeight) -> u64 {
    (height as u64) ^ (1 << 63)
}

struct KeyBuilder(Vec<u8>);

impl KeyBuilder {
    fn new(prefix: &str) -> Self {
        Self(prefix.as_bytes().to_vec())
    }

    fn str(self, s: &str) -> Self {
        self.bytes(s.as_bytes())
    }

    fn bytes(mut self, b: &[u8]) -> Self {
        let len = u16::try_from(b.len()).unwrap_or(u16::MAX);
        self.0.extend_from_slice(&len.to_be_bytes());
        self.0.extend_from_slice(&b[..len as usize]);
        self
    }

    fn height(mut self, height: BlockHeight) -> Self {
        self.0.extend_from_slice(&ordered_height(height).to_be_bytes());
        self
    }

    fn timestamp(mut self, ts: Timestamp) -> Self {
        self.0.extend_from_slice(&ts.to_be_bytes());
        self
    }

    fn build(self) -> Vec<u8> {
        self.0
    }
}

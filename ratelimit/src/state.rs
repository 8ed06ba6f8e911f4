//! Counter snapshots owned by the caller's store.

use serde::{Deserialize, Serialize};
use trustgate_types::{AccountAddress, Hash256, Timestamp};

pub const MINUTE_SECS: u64 = 60;
pub const HOUR_SECS: u64 = 3600;
pub const DAY_SECS: u64 = 24 * 3600;

/// The dimension an entity is rate-limited along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Phone,
    Ip,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Phone => "phone",
            Self::Ip => "ip",
        }
    }
}

/// Per-entity counters. Keyed in the store by `(entity_kind, entity_hash)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub entity_kind: EntityKind,
    pub entity_hash: Hash256,
    pub hourly_count: u32,
    pub hourly_window_start: Timestamp,
    pub daily_count: u32,
    pub daily_window_start: Timestamp,
    pub last_request_at: Option<Timestamp>,
    pub is_blocked: bool,
    pub blocked_until: Option<Timestamp>,
    pub block_reason: String,
    pub total_requests: u64,
    pub total_blocks: u64,
}

impl RateLimitState {
    /// A fresh state for an entity that has never made a request.
    pub fn new(entity_kind: EntityKind, entity_hash: Hash256) -> Self {
        Self {
            entity_kind,
            entity_hash,
            hourly_count: 0,
            hourly_window_start: Timestamp::EPOCH,
            daily_count: 0,
            daily_window_start: Timestamp::EPOCH,
            last_request_at: None,
            is_blocked: false,
            blocked_until: None,
            block_reason: String::new(),
            total_requests: 0,
            total_blocks: 0,
        }
    }

    pub fn for_account(account: &AccountAddress) -> Self {
        Self::new(
            EntityKind::Account,
            trustgate_crypto::hash_entity("account", account.as_str()),
        )
    }

    pub fn for_phone(phone: &str) -> Self {
        Self::new(EntityKind::Phone, trustgate_crypto::hash_phone(phone))
    }

    pub fn for_ip(ip: &str) -> Self {
        Self::new(EntityKind::Ip, trustgate_crypto::hash_ip(ip))
    }

    /// Whether a block is in force at `now`. A block without a deadline never lifts.
    pub fn block_active(&self, now: Timestamp) -> bool {
        self.is_blocked && self.blocked_until.map_or(true, |until| now < until)
    }

    /// The counters as they would read at `now` after lazy window rollover.
    pub(crate) fn rolled(&self, now: Timestamp) -> Self {
        let mut next = self.clone();
        if window_stale(next.hourly_count, next.hourly_window_start, HOUR_SECS, now) {
            next.hourly_count = 0;
            next.hourly_window_start = now;
        }
        if window_stale(next.daily_count, next.daily_window_start, DAY_SECS, now) {
            next.daily_count = 0;
            next.daily_window_start = now;
        }
        if next.is_blocked && !next.block_active(now) {
            next.is_blocked = false;
            next.blocked_until = None;
            next.block_reason.clear();
        }
        next
    }
}

/// Network-wide counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRateLimitState {
    pub minute_count: u32,
    pub minute_window_start: Timestamp,
    pub total_requests: u64,
}

impl GlobalRateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rolled(&self, now: Timestamp) -> Self {
        let mut next = self.clone();
        if window_stale(next.minute_count, next.minute_window_start, MINUTE_SECS, now) {
            next.minute_count = 0;
            next.minute_window_start = now;
        }
        next
    }
}

/// An empty window restarts at the first request; a used one once its duration has passed.
fn window_stale(count: u32, start: Timestamp, duration_secs: u64, now: Timestamp) -> bool {
    count == 0 || start.has_expired(duration_secs, now)
}

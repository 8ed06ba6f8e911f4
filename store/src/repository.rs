//! Typed persistence of verification state over any [`KvStore`].
//!
//! Records are bincode-encoded. Secondary indexes hold empty values; their
//! keys carry everything a scan needs to find the primary record.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use trustgate_ratelimit::{ChannelSnapshot, EntityKind, GlobalRateLimitState, RateLimitState};
use trustgate_types::{AccountAddress, BlockHeight, Hash256, ScopeId, Timestamp};
use trustgate_verification::{
    Challenge, FallbackRecord, FallbackStatus, KeyPrefixes, NonceSet, RequestStatus, ScopeState,
    VerificationCase, VerificationError, VerificationRequest,
};

use crate::keys::KeySpace;
use crate::kv::KvStore;
use crate::StoreError;

const INDEX_MARK: &[u8] = &[];
const USED_MARK: &[u8] = &[1];

/// What a case needs besides its request and records.
///
/// `scopes` is the case's own view; the account-level scope records hold
/// whatever the latest claiming request left there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct CaseLinks {
    scopes: Vec<ScopeState>,
    fallback_id: Option<String>,
    challenge_id: Option<String>,
    event_seq: u64,
}

pub struct VerificationRepository<S: KvStore> {
    store: S,
    keys: KeySpace,
}

impl<S: KvStore> VerificationRepository<S> {
    pub fn new(store: S, prefixes: KeyPrefixes) -> Result<Self, StoreError> {
        prefixes
            .validate()
            .map_err(|e| StoreError::Backend(format!("key prefixes: {e}")))?;
        Ok(Self {
            store,
            keys: KeySpace::new(prefixes),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Write a request and keep its indexes in step with its status.
    pub fn put_request(&self, request: &VerificationRequest) -> Result<(), StoreError> {
        let id = &request.request_id;
        self.put_record(&self.keys.request(id), request)?;
        self.store.put(
            &self.keys.request_by_account(&request.account_address, id),
            INDEX_MARK,
        )?;
        let pending = self.keys.pending_request(request.requested_block, id);
        if request.status == RequestStatus::Pending {
            self.store.put(&pending, INDEX_MARK)
        } else {
            self.store.delete(&pending)
        }
    }

    /// Insert a request that must not exist yet.
    pub fn insert_request(&self, request: &VerificationRequest) -> Result<(), StoreError> {
        if self.store.contains(&self.keys.request(&request.request_id))? {
            return Err(StoreError::Duplicate(request.request_id.clone()));
        }
        self.put_request(request)
    }

    pub fn get_request(&self, request_id: &str) -> Result<Option<VerificationRequest>, StoreError> {
        self.get_record(&self.keys.request(request_id))
    }

    pub fn requests_for_account(
        &self,
        account: &AccountAddress,
    ) -> Result<Vec<VerificationRequest>, StoreError> {
        let prefix = self.keys.requests_of_account(account);
        self.store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| {
                let id = id_at(&key, prefix.len())?;
                self.require(self.get_request(&id)?, &id)
            })
            .collect()
    }

    /// `Pending` requests submitted at or below `height`, lowest height first.
    pub fn pending_requests_up_to(
        &self,
        height: BlockHeight,
    ) -> Result<Vec<VerificationRequest>, StoreError> {
        let start = self.keys.prefixes().pending_request_by_height.as_bytes().to_vec();
        let end = match height.checked_add(1) {
            Some(next) => self.keys.pending_request_floor(next),
            None => crate::kv::prefix_upper_bound(&start).unwrap_or_default(),
        };
        self.store
            .range(&start, &end)?
            .into_iter()
            .map(|(key, _)| {
                let id = id_at(&key, start.len() + 8)?;
                self.require(self.get_request(&id)?, &id)
            })
            .collect()
    }

    // ── Fallbacks ───────────────────────────────────────────────────────

    pub fn put_fallback(&self, record: &FallbackRecord) -> Result<(), StoreError> {
        let id = &record.fallback_id;
        self.put_record(&self.keys.fallback(id), record)?;
        self.store.put(
            &self.keys.fallback_by_account(&record.account_address, id),
            INDEX_MARK,
        )?;
        let pending = self.keys.pending_fallback(record.expires_at, id);
        if record.status == FallbackStatus::Pending {
            self.store.put(&pending, INDEX_MARK)
        } else {
            self.store.delete(&pending)
        }
    }

    pub fn get_fallback(&self, fallback_id: &str) -> Result<Option<FallbackRecord>, StoreError> {
        self.get_record(&self.keys.fallback(fallback_id))
    }

    pub fn fallbacks_for_account(
        &self,
        account: &AccountAddress,
    ) -> Result<Vec<FallbackRecord>, StoreError> {
        let prefix = self.keys.fallbacks_of_account(account);
        self.store
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| {
                let id = id_at(&key, prefix.len())?;
                self.require(self.get_fallback(&id)?, &id)
            })
            .collect()
    }

    /// `Pending` fallbacks whose deadline is strictly before `now`, earliest first.
    pub fn fallbacks_expiring_before(
        &self,
        now: Timestamp,
    ) -> Result<Vec<FallbackRecord>, StoreError> {
        let start = self.keys.prefixes().pending_fallback_by_expiry.as_bytes().to_vec();
        let end = self.keys.pending_fallback_floor(now);
        self.store
            .range(&start, &end)?
            .into_iter()
            .map(|(key, _)| {
                let id = id_at(&key, start.len() + 8)?;
                self.require(self.get_fallback(&id)?, &id)
            })
            .collect()
    }

    // ── Challenges and scopes ───────────────────────────────────────────

    pub fn put_challenge(&self, challenge: &Challenge) -> Result<(), StoreError> {
        self.put_record(&self.keys.challenge(&challenge.challenge_id), challenge)
    }

    pub fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>, StoreError> {
        self.get_record(&self.keys.challenge(challenge_id))
    }

    pub fn put_scope(&self, scope: &ScopeState) -> Result<(), StoreError> {
        self.put_record(&self.keys.scope(&scope.account, &scope.scope_id), scope)
    }

    pub fn get_scope(
        &self,
        account: &AccountAddress,
        scope_id: &ScopeId,
    ) -> Result<Option<ScopeState>, StoreError> {
        self.get_record(&self.keys.scope(account, scope_id))
    }

    pub fn scopes_for_account(
        &self,
        account: &AccountAddress,
    ) -> Result<Vec<ScopeState>, StoreError> {
        self.store
            .scan_prefix(&self.keys.scopes_of_account(account))?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }

    // ── Rate limits ─────────────────────────────────────────────────────

    pub fn get_rate_limit(
        &self,
        kind: EntityKind,
        entity_hash: &Hash256,
    ) -> Result<Option<RateLimitState>, StoreError> {
        self.get_record(&self.keys.rate_limit(kind, entity_hash))
    }

    /// The stored state, or a fresh one for an entity never seen before.
    pub fn rate_limit_or_new(
        &self,
        kind: EntityKind,
        entity_hash: Hash256,
    ) -> Result<RateLimitState, StoreError> {
        Ok(self
            .get_rate_limit(kind, &entity_hash)?
            .unwrap_or_else(|| RateLimitState::new(kind, entity_hash)))
    }

    pub fn put_rate_limit(&self, state: &RateLimitState) -> Result<(), StoreError> {
        self.put_record(
            &self.keys.rate_limit(state.entity_kind, &state.entity_hash),
            state,
        )
    }

    pub fn global_rate_limit(&self) -> Result<GlobalRateLimitState, StoreError> {
        Ok(self
            .get_record(&self.keys.global_rate_limit())?
            .unwrap_or_default())
    }

    pub fn put_global_rate_limit(&self, state: &GlobalRateLimitState) -> Result<(), StoreError> {
        self.put_record(&self.keys.global_rate_limit(), state)
    }

    /// Load every counter a channel request touches.
    pub fn channel_snapshot(
        &self,
        account: &AccountAddress,
        phone: Option<&str>,
        ip: Option<&str>,
    ) -> Result<ChannelSnapshot, StoreError> {
        let fresh = RateLimitState::for_account(account);
        let mut snapshot = ChannelSnapshot::new(
            self.rate_limit_or_new(fresh.entity_kind, fresh.entity_hash)?,
            self.global_rate_limit()?,
        );
        if let Some(phone) = phone {
            let fresh = RateLimitState::for_phone(phone);
            snapshot = snapshot.with_phone(self.rate_limit_or_new(fresh.entity_kind, fresh.entity_hash)?);
        }
        if let Some(ip) = ip {
            let fresh = RateLimitState::for_ip(ip);
            snapshot = snapshot.with_ip(self.rate_limit_or_new(fresh.entity_kind, fresh.entity_hash)?);
        }
        Ok(snapshot)
    }

    pub fn put_channel_snapshot(&self, snapshot: &ChannelSnapshot) -> Result<(), StoreError> {
        self.put_rate_limit(&snapshot.account)?;
        for state in snapshot.phone.iter().chain(snapshot.ip.iter()) {
            self.put_rate_limit(state)?;
        }
        self.put_global_rate_limit(&snapshot.global)
    }

    // ── Used nonces ─────────────────────────────────────────────────────

    pub fn is_nonce_used(&self, nonce_hash: &Hash256) -> Result<bool, StoreError> {
        self.store.contains(&self.keys.used_nonce(nonce_hash))
    }

    pub fn mark_nonce_used(&self, nonce_hash: &Hash256) -> Result<(), StoreError> {
        self.store.put(&self.keys.used_nonce(nonce_hash), USED_MARK)
    }

    // ── Cases ───────────────────────────────────────────────────────────

    /// Persist every part of a case.
    ///
    /// Account-level scope records are written only for scopes the case owns.
    /// An in-flight scope takes over a record another request left `Rejected`
    /// or `Expired` no later than the claim. A settled case never overwrites a
    /// later claim. Any other in-flight write fails with `ScopeOwned` before
    /// anything is written.
    pub fn put_case(&self, case: &VerificationCase) -> Result<(), StoreError> {
        let request_id = &case.request.request_id;
        let mut owned = Vec::with_capacity(case.scopes.len());
        for scope in &case.scopes {
            match self.get_scope(&scope.account, &scope.scope_id)? {
                Some(stored) if stored.request_id.is_some() && !stored.owned_by(request_id) => {
                    let reopens = stored.status.is_terminal()
                        && !stored.status.is_verified()
                        && stored.updated_at <= scope.updated_at;
                    if scope.status.is_in_flight() && reopens {
                        owned.push(scope);
                    } else if scope.status.is_in_flight() {
                        return Err(StoreError::ScopeOwned {
                            scope_id: scope.scope_id.to_string(),
                            owner: stored.request_id.unwrap_or_default(),
                            status: stored.status,
                        });
                    } else {
                        tracing::trace!(
                            request_id = %request_id,
                            scope = %scope.scope_id,
                            "scope claimed by a later request; keeping case view only"
                        );
                    }
                }
                _ => owned.push(scope),
            }
        }

        self.put_request(&case.request)?;
        for scope in owned {
            self.put_scope(scope)?;
        }
        if let Some(fallback) = &case.fallback {
            self.put_fallback(fallback)?;
        }
        if let Some(challenge) = &case.challenge {
            self.put_challenge(challenge)?;
        }
        let links = CaseLinks {
            scopes: case.scopes.clone(),
            fallback_id: case.fallback.as_ref().map(|f| f.fallback_id.clone()),
            challenge_id: case.challenge.as_ref().map(|c| c.challenge_id.clone()),
            event_seq: case.event_seq,
        };
        self.put_record(&self.keys.case(&case.request.request_id), &links)?;
        tracing::trace!(request_id = %case.request.request_id, "case stored");
        Ok(())
    }

    /// Rebuild a case from its parts.
    pub fn load_case(&self, request_id: &str) -> Result<Option<VerificationCase>, StoreError> {
        let Some(request) = self.get_request(request_id)? else {
            return Ok(None);
        };
        let links: CaseLinks = self.require(
            self.get_record(&self.keys.case(request_id))?,
            request_id,
        )?;
        let fallback = match &links.fallback_id {
            Some(id) => Some(self.require(self.get_fallback(id)?, id)?),
            None => None,
        };
        let challenge = match &links.challenge_id {
            Some(id) => Some(self.require(self.get_challenge(id)?, id)?),
            None => None,
        };
        Ok(Some(VerificationCase {
            request,
            scopes: links.scopes,
            fallback,
            challenge,
            event_seq: links.event_seq,
        }))
    }

    pub fn require_case(&self, request_id: &str) -> Result<VerificationCase, StoreError> {
        self.load_case(request_id)?
            .ok_or_else(|| StoreError::NotFound(format!("case {request_id}")))
    }

    // ── Encoding ────────────────────────────────────────────────────────

    fn put_record<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), StoreError> {
        self.store.put(key, &bincode::serialize(value)?)
    }

    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        self.store.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// An index entry pointing at a missing record means the store is corrupt.
    fn require<T>(&self, value: Option<T>, id: &str) -> Result<T, StoreError> {
        value.ok_or_else(|| StoreError::Corruption(format!("index entry {id} has no record")))
    }
}

impl<S: KvStore> NonceSet for VerificationRepository<S> {
    fn is_used(&self, nonce_hash: &Hash256) -> Result<bool, VerificationError> {
        Ok(self.is_nonce_used(nonce_hash)?)
    }

    fn mark_used(&mut self, nonce_hash: Hash256) -> Result<(), VerificationError> {
        Ok(self.mark_nonce_used(&nonce_hash)?)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Decode the length-prefixed id that ends an index key at `offset`.
fn id_at(key: &[u8], offset: usize) -> Result<String, StoreError> {
    let corrupt = || StoreError::Corruption(format!("malformed index key {key:02x?}"));
    let tail = key.get(offset..).ok_or_else(corrupt)?;
    let (len, id) = match tail {
        [hi, lo, id @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, id),
        _ => return Err(corrupt()),
    };
    if id.len() != len {
        return Err(corrupt());
    }
    String::from_utf8(id.to_vec()).map_err(|_| corrupt())
}

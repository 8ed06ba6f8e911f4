use proptest::prelude::*;
use std::collections::BTreeSet;

use trustgate_types::{
    AccountAddress, BlockSeed, BorderlineParams, ChallengeParams, ErrorKind, FactorKind,
    QueueParams, ScopeId, Timestamp, VerificationStatus, MAX_SCORE,
};
use trustgate_verification::{
    can_transition, classify, BorderlineEngine, ChallengeRegistry, Decision, FallbackStatus,
    RequestQueue, RequestStatus, StatusMachine,
};

fn any_status() -> impl Strategy<Value = VerificationStatus> {
    prop::sample::select(VerificationStatus::ALL.to_vec())
}

fn thresholds() -> impl Strategy<Value = (u32, u32)> {
    (0u32..=MAX_SCORE, 0u32..=MAX_SCORE).prop_map(|(a, b)| (a.min(b), a.max(b)))
}

fn band(lower: u32, upper: u32) -> BorderlineParams {
    BorderlineParams {
        lower_threshold: lower,
        upper_threshold: upper,
        ..BorderlineParams::defaults()
    }
}

fn engine() -> BorderlineEngine {
    BorderlineEngine::new(
        BorderlineParams::defaults(),
        ChallengeRegistry::new(ChallengeParams::defaults()).unwrap(),
    )
    .unwrap()
}

proptest! {
    /// Reject below the band, Verify at or above it, Escalate inside.
    #[test]
    fn classification_is_half_open((lower, upper) in thresholds(), score in 0u32..=MAX_SCORE) {
        let decision = classify(&band(lower, upper), score);
        prop_assert_eq!(decision == Decision::Reject, score < lower);
        prop_assert_eq!(decision == Decision::Verify, score >= upper && score >= lower);
        prop_assert_eq!(decision == Decision::Escalate, lower <= score && score < upper);
    }

    /// Both edges of a non-empty band escalate.
    #[test]
    fn band_edges_escalate((lower, upper) in thresholds()) {
        prop_assume!(lower < upper);
        let params = band(lower, upper);
        prop_assert_eq!(classify(&params, lower), Decision::Escalate);
        prop_assert_eq!(classify(&params, upper - 1), Decision::Escalate);
    }

    /// Every pair outside the table fails and leaves the status untouched.
    #[test]
    fn transitions_outside_table_rejected(from in any_status(), to in any_status()) {
        let mut status = from;
        let result = StatusMachine.transition(
            &mut status,
            to,
            "table check",
            Timestamp::new(1),
            &Default::default(),
        );
        if can_transition(from, to) {
            let event = result.unwrap();
            prop_assert_eq!(status, to);
            prop_assert_eq!(event.previous_status, from);
            prop_assert_eq!(event.new_status, to);
        } else {
            let err = result.unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::InvalidTransition);
            prop_assert_eq!(status, from);
        }
    }

    /// Once a fallback is terminal, every later call fails with AlreadyTerminal.
    #[test]
    fn fallback_is_monotonic(close in 0u8..4, offset in 0u64..2_000, factors in prop::collection::vec(0usize..5, 0..4)) {
        let e = engine();
        let (mut record, _) = e
            .open_fallback(&AccountAddress::new("acct_p"), "req_p/0", 70, Timestamp::new(10_000), 1, &BlockSeed::new([4; 32]))
            .unwrap();
        let at = Timestamp::new(10_001);
        match close {
            0 => { e.resolve(&mut record, &[FactorKind::Sms], at).unwrap(); }
            1 => { e.mark_failed(&mut record, "failed", at).unwrap(); }
            2 => { e.mark_cancelled(&mut record, "cancelled", at).unwrap(); }
            _ => { e.resolve(&mut record, &[], Timestamp::new(20_000)).unwrap(); }
        }
        prop_assert!(record.status.is_terminal());
        let settled = record.clone();

        let later = Timestamp::new(10_001 + offset);
        let presented: Vec<FactorKind> = factors.iter().map(|i| FactorKind::ALL[*i]).collect();
        let errs = [
            e.resolve(&mut record, &presented, later).unwrap_err(),
            e.mark_failed(&mut record, "x", later).unwrap_err(),
            e.mark_cancelled(&mut record, "x", later).unwrap_err(),
        ];
        for err in errs {
            prop_assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
        }
        prop_assert!(!e.expire_if_due(&mut record, Timestamp::new(u64::MAX)));
        prop_assert_eq!(record, settled);
    }

    /// retry_count never passes max_retries, and the call after the last
    /// permitted retry fails the request.
    #[test]
    fn retry_count_is_bounded(max_retries in 0u32..6, attempts in 1usize..12) {
        let queue = RequestQueue::new(QueueParams { max_retries, ..QueueParams::defaults() }).unwrap();
        let mut req = queue
            .submit(&AccountAddress::new("acct_q"), vec![ScopeId::new("s")], 0, Timestamp::new(1), 1, &BlockSeed::ZERO)
            .unwrap();
        for i in 0..attempts {
            let now = Timestamp::new(2 + i as u64);
            if queue.begin_attempt(&mut req, now).is_err() {
                break;
            }
            let result = queue.retry(&mut req, now);
            prop_assert!(req.retry_count <= max_retries);
            if i as u32 >= max_retries {
                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::RetriesExhausted);
                prop_assert_eq!(req.status, RequestStatus::Failed);
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }

    /// A challenge completes once; the same nonce is then a replay.
    /// Challenges issued in one block for different subjects never share an id or nonce.
    #[test]
    fn subjects_separate_same_block_challenges(a in "[a-z0-9/]{1,16}", b in "[a-z0-9/]{1,16}", seed in prop::array::uniform32(0u8..)) {
        prop_assume!(a != b);
        let registry = ChallengeRegistry::new(ChallengeParams::defaults()).unwrap();
        let account = AccountAddress::new("acct_s");
        let now = Timestamp::new(7_000);
        let seed = BlockSeed::new(seed);
        let first = registry.issue(&account, FactorKind::Sms, &a, now, 60, &seed).unwrap();
        let second = registry.issue(&account, FactorKind::Sms, &b, now, 60, &seed).unwrap();
        prop_assert_ne!(first.challenge_id, second.challenge_id);
        prop_assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn challenge_completes_exactly_once(ttl in 1i64..3_600, elapsed in 0u64..3_600, seed in prop::array::uniform32(0u8..)) {
        prop_assume!(elapsed <= ttl as u64);
        let registry = ChallengeRegistry::new(ChallengeParams::defaults()).unwrap();
        let issued = Timestamp::new(50_000);
        let challenge = registry
            .issue(&AccountAddress::new("acct_c"), FactorKind::Email, "case_c", issued, ttl, &BlockSeed::new(seed))
            .unwrap();
        let mut used = BTreeSet::new();
        let now = issued.plus_secs(elapsed);

        let mut first = challenge.clone();
        let nonce = challenge.nonce.clone();
        prop_assert!(registry.complete(&mut first, &nonce, &mut used, now).is_ok());

        let mut second = challenge;
        let err = registry.complete(&mut second, &nonce, &mut used, now).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::NonceReplay);
    }
}

#[test]
fn fallback_projection_tracks_status() {
    let e = engine();
    let (mut record, _) = e
        .open_fallback(&AccountAddress::new("acct_p"), "req_p/0", 70, Timestamp::new(0), 1, &BlockSeed::ZERO)
        .unwrap();
    assert_eq!(record.projected_status(), VerificationStatus::AdditionalFactorPending);
    e.resolve(&mut record, &[FactorKind::Email], Timestamp::new(5)).unwrap();
    assert_eq!(record.status, FallbackStatus::Completed);
    assert_eq!(record.projected_status(), VerificationStatus::Verified);
}

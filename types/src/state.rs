//! Verification status attached to a scope or an account.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The verification status of a scope or account.
///
/// Only the transition table in `trustgate-verification` may change it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VerificationStatus {
    /// Nothing has been claimed yet.
    #[default]
    Unknown,
    /// A verification has been requested.
    Pending,
    /// A verification attempt is being evaluated.
    InProgress,
    /// The scope is verified.
    Verified,
    /// The attempt was rejected. Re-enterable into `Pending`.
    Rejected,
    /// A verification lapsed. Re-enterable into `Pending`.
    Expired,
    /// The score landed in the borderline band; a secondary factor is required.
    NeedsAdditionalFactor,
    /// A secondary-factor challenge is outstanding.
    AdditionalFactorPending,
}

impl VerificationStatus {
    pub const ALL: [VerificationStatus; 8] = [
        Self::Unknown,
        Self::Pending,
        Self::InProgress,
        Self::Verified,
        Self::Rejected,
        Self::Expired,
        Self::NeedsAdditionalFactor,
        Self::AdditionalFactorPending,
    ];

    /// Terminal for reporting purposes. `Rejected` and `Expired` can still
    /// re-enter `Pending` for a fresh attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Expired)
    }

    /// Whether downstream consumers may treat the scope as verified.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Whether an open request is driving the scope.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Self::Unknown) && !self.is_terminal()
    }

    /// Whether the scope is waiting on a secondary factor.
    pub fn awaits_factor(&self) -> bool {
        matches!(
            self,
            Self::NeedsAdditionalFactor | Self::AdditionalFactorPending
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::NeedsAdditionalFactor => "needs_additional_factor",
            Self::AdditionalFactorPending => "additional_factor_pending",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

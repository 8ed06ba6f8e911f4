//! Out-of-band factor kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A secondary verification factor / challenge channel.
///
/// Every out-of-band proof the engine accepts is one of these. Challenges are
/// channel-agnostic; the kind only decides which rate-limit channel gates
/// issuance and which upstream system supplies the proof.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    /// One-time code delivered by SMS.
    Sms,
    /// Verification link delivered by email.
    Email,
    /// OAuth/OIDC single sign-on linkage.
    Sso,
    /// Active Directory single sign-on linkage.
    AdSso,
    /// DNS or well-known-file proof of domain ownership.
    Domain,
}

impl FactorKind {
    pub const ALL: [FactorKind; 5] = [
        Self::Sms,
        Self::Email,
        Self::Sso,
        Self::AdSso,
        Self::Domain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Sso => "sso",
            Self::AdSso => "ad_sso",
            Self::Domain => "domain",
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

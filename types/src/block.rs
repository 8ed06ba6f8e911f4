//! Block context supplied by the caller's block-execution environment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of the ledger block in which a call executes.
pub type BlockHeight = i64;

/// Per-block entropy (typically the block hash) supplied by the caller.
///
/// Every nonce and identifier the engine derives is a digest over this seed and
/// the call inputs, so all replaying nodes derive identical values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSeed([u8; 32]);

impl Default for BlockSeed {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockSeed {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockSeed(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

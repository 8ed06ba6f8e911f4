//! Nullable clock: deterministic time, height and block seed for testing.

use std::cell::Cell;
use trustgate_crypto::blake2b_256_multi;
use trustgate_types::{BlockHeight, BlockSeed, Timestamp};
use trustgate_verification::BlockContext;

/// A deterministic block clock.
///
/// Time and height only advance when you tell it to. The block seed is a
/// digest of the height, so replays derive identical nonces.
pub struct NullClock {
    current: Cell<u64>,
    height: Cell<BlockHeight>,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: Cell::new(initial_secs),
            height: Cell::new(1),
        }
    }

    /// Get the current time.
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.current.get())
    }

    pub fn height(&self) -> BlockHeight {
        self.height.get()
    }

    pub fn seed(&self) -> BlockSeed {
        let height = self.height.get().to_be_bytes();
        BlockSeed::new(blake2b_256_multi(&[b"null-clock".as_slice(), height.as_slice()]))
    }

    /// The context a call made right now would receive.
    pub fn block(&self) -> BlockContext {
        BlockContext::new(self.now(), self.height(), self.seed())
    }

    /// Advance time by a number of seconds. Any move forward opens the next
    /// block; advancing by zero stays in the current one.
    pub fn advance(&self, secs: u64) {
        if secs == 0 {
            return;
        }
        self.current.set(self.current.get() + secs);
        self.height.set(self.height.get() + 1);
    }

    /// Set the time to a specific value.
    pub fn set(&self, secs: u64) {
        self.current.set(secs);
    }
}

//! Multi-window rate limiting for verification channels.
//!
//! The limiter is a stateless policy over caller-supplied counter snapshots.
//! Each rate-limited entity (account, phone hash, IP hash) has a
//! [`RateLimitState`] holding an hourly and a daily window; the network as a
//! whole has a [`GlobalRateLimitState`] with a one-minute window.
//!
//! Windows roll forward lazily: a window resets the first time it is touched
//! after its duration has elapsed, never on a timer. Blocks lift the same way
//! once `blocked_until` has passed. Every operation takes `now` explicitly and
//! returns the advanced state by value.

pub mod channel;
pub mod error;
pub mod limiter;
pub mod state;

pub use channel::ChannelSnapshot;
pub use error::RateLimitError;
pub use limiter::{Denial, LimitType, RateLimitCheck, RateLimiter};
pub use state::{
    EntityKind, GlobalRateLimitState, RateLimitState, DAY_SECS, HOUR_SECS, MINUTE_SECS,
};

//! Monotonic timestamp source for outgoing packet headers.
//!
//! The wire format calls for a monotonic clock, not wall-clock time, so
//! packet timestamps are seconds/nanoseconds elapsed since the server
//! process started rather than since the Unix epoch.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

/// Returns `(seconds, nanoseconds)` elapsed since the first call to any
/// function in this module, as a stand-in for `CLOCK_MONOTONIC`.
pub fn monotonic_timestamp() -> (u32, u32) {
    let start = START.get_or_init(Instant::now);
    let elapsed = start.elapsed();
    (elapsed.as_secs() as u32, elapsed.subsec_nanos())
}

//! Time-related helpers.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, timeout, Duration};
//!
//! async fn example() {
//!     let result = timeout(Duration::from_millis(50), sleep(Duration::from_millis(5))).await;
//!     assert!(result.is_ok());
//! }
//! ```

pub use tokio::time::{
    error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout,
};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Returns the current time as milliseconds since UNIX_EPOCH.
///
/// A clock set before the epoch reports `0`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a `SystemTime` (typically a file's mtime) to unix seconds.
///
/// Times before the epoch clamp to `0`.
pub fn unix_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

//! Async runtime facade for the Clip Flow core.
//!
//! Every `core-*` and `bridge-*` crate reaches the executor through this crate
//! instead of naming Tokio directly, so the runtime choice lives in one place.
//!
//! # Modules
//!
//! - `task`: spawning async and blocking work
//! - `time`: sleeps, timeouts, wall-clock helpers
//! - `sync`: channels, async locks and cancellation tokens
//! - `runtime`: `block_on` for synchronous entry points and tests
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Async entry-point/test macros, so downstream crates never need Tokio's.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

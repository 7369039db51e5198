//! Task spawning.
//!
//! `spawn` runs a future on the ambient Tokio runtime; `spawn_blocking` moves
//! filesystem walks and other synchronous work onto the blocking pool.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let size = task::spawn_blocking(|| std::fs::metadata(".").map(|m| m.len()))
//!         .await
//!         .unwrap();
//!     assert!(size.is_ok());
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// The returned `JoinHandle` resolves to `Err(JoinError)` if the task panics
/// or is aborted.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Renders a panic payload caught with `catch_unwind` as a message.
///
/// Panic payloads are usually `&str` or `String`; anything else is reported
/// generically.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

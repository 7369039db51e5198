//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the cancellation
//! token used to stop watchers and debounce timers.
//!
//! Short synchronous critical sections (queue bookkeeping, the status map)
//! use `std::sync::Mutex` directly; these types are for state held across
//! `.await` points.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, CancellationToken};
//!
//! async fn example() {
//!     let (tx, mut rx) = watch::channel(0u32);
//!     tx.send(1).unwrap();
//!     rx.changed().await.unwrap();
//!     assert_eq!(*rx.borrow(), 1);
//!
//!     let token = CancellationToken::new();
//!     token.cancel();
//!     assert!(token.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;

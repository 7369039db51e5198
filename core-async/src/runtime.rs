//! Runtime utilities wrapping Tokio's executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Used by `#[core_async::test]` and `#[core_async::main]`. Panics if the
/// runtime cannot be constructed, which only happens when the OS refuses to
/// create the timer or IO driver.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Returns the handle of the runtime driving the current task, if any.
pub fn current() -> Option<Handle> {
    Handle::try_current().ok()
}

//! Clip Flow workspace crate.
//!
//! Re-exports the core crates so a host application can depend on one crate
//! and pick platform defaults with features:
//!
//! - `desktop-shims` (default): SQLite settings, OS keyring, filesystem
//!   scanner and `notify` watcher, plus the HTTP provider clients.

pub use bridge_traits as bridge;
pub use core_library as library;
pub use core_pipeline as pipeline;
pub use core_queue as queue;
pub use core_runtime as runtime;
pub use core_service as service;

pub use core_runtime::config::CoreConfig;
pub use core_service::{CoreError, CoreService, DispatchReport, Result};

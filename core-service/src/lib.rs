//! Core service façade.
//!
//! This crate wires the configured bridges (settings store, secure store,
//! directory scanner and watcher, transcription and summarization engines)
//! into a single directory session consumed by the UI. Desktop apps enable the
//! `desktop-shims` feature, which lets [`CoreConfig`](core_runtime::config::CoreConfig)
//! fill in the `bridge-desktop` adapters for anything not provided.
//!
//! ```ignore
//! let config = CoreConfig::builder().auto_process(true).build()?;
//! let core = CoreService::new(config)?;
//! core.restore().await?;
//! core.open_directory("/Users/me/Videos").await?;
//! let mut events = core.subscribe();
//! ```

mod background;
pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::{CoreService, DispatchReport};

//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the Clip Flow core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the queue, library,
//! pipeline and service crates depend on. It establishes the configuration
//! contract (which bridges must be injected, which settings exist), the
//! logging conventions, and the event broadcasting used to keep a UI in sync
//! with asynchronous job completion.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};

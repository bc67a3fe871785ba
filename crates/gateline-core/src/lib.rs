//! Gateline Core Library
//!
//! Shared functionality for Gateline components:
//! - Configuration resolution (defaults, config file, environment)
//! - Database pool helpers and shared storage errors
//! - Common error types
//! - Tracing initialization

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};

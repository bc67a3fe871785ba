//! SQLite capacity store for the Gateline engine.
//!
//! Provides persistence for events, quotas, registrations, claim tokens,
//! and rate-limit keys.

mod db;
mod models;
mod queries_events;
mod queries_rate_limit;
mod queries_registrations;
mod queries_tokens;

#[cfg(test)]
mod tests;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use queries_events::{EventParams, QuotaParams};

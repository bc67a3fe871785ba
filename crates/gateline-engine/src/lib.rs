//! Gateline admission engine.
//!
//! Capacity-bounded admission for event registration: per-quota capacity,
//! a shared event-wide open pool, a single global queue, single-use claim
//! tokens with rate limiting, background expiry, and a live status feed.

pub mod admission;
pub mod engine;
pub mod error;
pub mod feed;
pub mod storage;
pub mod tokens;
pub mod workers;

pub use admission::{AdmissionRecord, AdmissionStatus};
pub use engine::{DefaultEngine, Engine};
pub use error::EngineError;
pub use feed::AdmissionSnapshot;
pub use storage::Database;
pub use tokens::{ClaimedToken, RateLimiter};

//! Claim-token secrets and the rate-limiter capability.
//!
//! A claim token reserves a registration attempt before it is finished. The
//! secret is generated here, handed to the caller exactly once, and only its
//! sha256 is stored. Rate limiting is an explicit capability the claim path
//! depends on, not ambient state: the [`RateLimiter`] trait is the seam, and
//! [`SqliteRateLimiter`] is the shipped TTL-counter implementation.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::storage::{Database, DatabaseError};

/// A freshly issued claim token. The secret is not retrievable afterwards.
#[derive(Debug, Clone)]
pub struct ClaimedToken {
    pub token_id: String,
    pub secret: String,
}

/// Identity of one rate-limit counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub event_id: String,
    /// `None` for an event-wide key.
    pub quota_id: Option<String>,
    pub client_identity: String,
}

/// Outcome of one counted claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Attempt counted and allowed; `count` is the attempts so far in the
    /// current window.
    Allowed { count: u32 },
    /// Over the threshold; the caller must back off for `retry_after`.
    Denied { retry_after: Duration },
}

/// Counter capability: increment-and-check against a limit within a window,
/// plus the fast-path release used when a registration finishes.
pub trait RateLimiter: Clone + Send + Sync + 'static {
    fn increment_and_check(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: Duration,
    ) -> impl Future<Output = Result<RateLimitDecision, DatabaseError>> + Send;

    fn release(&self, key: &RateLimitKey)
    -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

/// TTL-counter rate limiter backed by the engine database. Stands in for an
/// external key-value store with TTL; the increment is a single atomic
/// UPSERT, so concurrent claims never race the counter.
#[derive(Clone)]
pub struct SqliteRateLimiter {
    db: Database,
}

impl SqliteRateLimiter {
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

impl RateLimiter for SqliteRateLimiter {
    async fn increment_and_check(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, DatabaseError> {
        let now = gateline_core::db::unix_timestamp_ms();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let window_ms = window.as_millis() as i64;

        let (count, expires_at) = self
            .db
            .increment_rate_limit(
                &key.event_id,
                key.quota_id.as_deref(),
                &key.client_identity,
                now,
                window_ms,
            )
            .await?;

        if count > i64::from(limit) {
            let remaining_ms = u64::try_from(expires_at.saturating_sub(now)).unwrap_or(0);
            return Ok(RateLimitDecision::Denied {
                retry_after: Duration::from_millis(remaining_ms),
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(RateLimitDecision::Allowed {
            count: count as u32,
        })
    }

    async fn release(&self, key: &RateLimitKey) -> Result<bool, DatabaseError> {
        self.db
            .release_rate_limit(
                &key.event_id,
                key.quota_id.as_deref(),
                &key.client_identity,
            )
            .await
    }
}

/// Generate an opaque 256-bit secret, hex-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut out = String::with_capacity(64);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Hash a secret for storage. Only hashes ever touch the database.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

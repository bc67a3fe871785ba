//! Rate-limit key queries for the Gateline capacity store.
//!
//! The counter lives behind the `RateLimiter` capability in `tokens`; this
//! module only provides the atomic storage operations. The increment is one
//! UPSERT that also handles window rollover, so concurrent claims never
//! read-modify-write the counter.

use super::db::{Database, DatabaseError};

impl Database {
    /// Increment the counter for `(event_id, quota_id, client_identity)`.
    ///
    /// An expired key (its `expires_at` has passed) restarts at 1 with a
    /// fresh window ending at `now_ms + window_ms`. Returns the counter
    /// value after the increment and the window's expiry.
    pub async fn increment_rate_limit(
        &self,
        event_id: &str,
        quota_id: Option<&str>,
        client_identity: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> Result<(i64, i64), DatabaseError> {
        let new_expiry = now_ms + window_ms;

        let row: (i64, i64) = sqlx::query_as(
            r"
            INSERT INTO rate_limit_keys (event_id, quota_id, client_identity, count, expires_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(event_id, quota_id, client_identity) DO UPDATE SET
                count = CASE WHEN rate_limit_keys.expires_at <= ?
                    THEN 1 ELSE rate_limit_keys.count + 1 END,
                expires_at = CASE WHEN rate_limit_keys.expires_at <= ?
                    THEN ? ELSE rate_limit_keys.expires_at END
            RETURNING count, expires_at
            ",
        )
        .bind(event_id)
        .bind(quota_id.unwrap_or(""))
        .bind(client_identity)
        .bind(new_expiry)
        .bind(now_ms)
        .bind(now_ms)
        .bind(new_expiry)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    /// Delete the key for one client (fast-path release when their
    /// registration finishes). Idempotent.
    pub async fn release_rate_limit(
        &self,
        event_id: &str,
        quota_id: Option<&str>,
        client_identity: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM rate_limit_keys WHERE event_id = ? AND quota_id = ? AND client_identity = ?",
        )
        .bind(event_id)
        .bind(quota_id.unwrap_or(""))
        .bind(client_identity)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete keys whose TTL has elapsed. Idempotent.
    pub async fn reap_rate_limit_keys(&self, now_ms: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM rate_limit_keys WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

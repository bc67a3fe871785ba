//! Claim-token queries for the Gateline capacity store.
//!
//! Consumption is a single conditional UPDATE with a `used = 0` guard, so
//! two concurrent consumers of the same secret resolve in the store: the
//! second UPDATE matches no row and loses deterministically.

use gateline_core::db::unix_timestamp_ms;

use super::db::{Database, DatabaseError};
use super::models::{ClaimToken, Participant, Registration};

impl Database {
    /// Store a new unused claim token bound to `(event_id, quota_id)`.
    pub async fn create_claim_token(
        &self,
        id: &str,
        event_id: &str,
        quota_id: &str,
        secret_hash: &str,
        client_identity: &str,
    ) -> Result<ClaimToken, DatabaseError> {
        let now = unix_timestamp_ms();

        sqlx::query(
            r"
            INSERT INTO claim_tokens (id, event_id, quota_id, secret_hash, client_identity, used, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            ",
        )
        .bind(id)
        .bind(event_id)
        .bind(quota_id)
        .bind(secret_hash)
        .bind(client_identity)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_claim_token(id).await
    }

    /// Get a claim token by ID.
    pub async fn get_claim_token(&self, id: &str) -> Result<ClaimToken, DatabaseError> {
        sqlx::query_as::<_, ClaimToken>("SELECT * FROM claim_tokens WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Claim token {id}")))
    }

    /// Consume a claim token and create the provisional registration it was
    /// reserving, in one transaction.
    ///
    /// Returns `Ok(None)` when the token is missing, expired (created before
    /// `issued_after_ms`), or already used. The token's bound event, quota,
    /// and client identity are copied onto the registration.
    pub async fn consume_claim_token(
        &self,
        secret_hash: &str,
        issued_after_ms: i64,
        registration_id: &str,
        update_token: &str,
        participant: Option<&Participant>,
    ) -> Result<Option<Registration>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let consumed = sqlx::query_as::<_, (String, String, String)>(
            r"
            UPDATE claim_tokens
            SET used = 1
            WHERE secret_hash = ? AND used = 0 AND created_at >= ?
            RETURNING event_id, quota_id, client_identity
            ",
        )
        .bind(secret_hash)
        .bind(issued_after_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((event_id, quota_id, client_identity)) = consumed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let now = unix_timestamp_ms();

        sqlx::query(
            r"
            INSERT INTO registrations (
                id, event_id, quota_id, is_finished,
                first_name, last_name, email,
                client_identity, update_token, created_at
            ) VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(registration_id)
        .bind(&event_id)
        .bind(&quota_id)
        .bind(participant.map(|p| p.first_name.as_str()))
        .bind(participant.map(|p| p.last_name.as_str()))
        .bind(participant.map(|p| p.email.as_str()))
        .bind(&client_identity)
        .bind(update_token)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_registration(registration_id).await.map(Some)
    }

    /// Delete claim tokens created before `cutoff_ms` (consumed tokens are
    /// swept too; they are spent either way). Idempotent.
    pub async fn reap_claim_tokens(&self, cutoff_ms: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM claim_tokens WHERE created_at < ?")
            .bind(cutoff_ms)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

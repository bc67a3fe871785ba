//! Registration queries for the Gateline capacity store.
//!
//! There is deliberately no way to update `created_at` here: it is the sole
//! ordering key for admission, so it is written once at insert and never
//! touched again.

use super::db::{Database, DatabaseError};
use super::models::{Participant, Registration};

impl Database {
    /// Get a registration by ID.
    pub async fn get_registration(&self, id: &str) -> Result<Registration, DatabaseError> {
        sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Registration {id}")))
    }

    /// Mark a registration finished and store its participant fields.
    /// Returns `false` if no such registration exists.
    pub async fn finish_registration(
        &self,
        id: &str,
        participant: &Participant,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE registrations
            SET is_finished = 1, first_name = ?, last_name = ?, email = ?
            WHERE id = ?
            ",
        )
        .bind(&participant.first_name)
        .bind(&participant.last_name)
        .bind(&participant.email)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a registration by ID. Idempotent: deleting an absent row
    /// returns `Ok(None)`. On success returns the owning event and whether
    /// the row was finished (so callers know whether admission changed).
    pub async fn delete_registration(
        &self,
        id: &str,
    ) -> Result<Option<(String, bool)>, DatabaseError> {
        let row = sqlx::query_as::<_, (String, i64)>(
            "DELETE FROM registrations WHERE id = ? RETURNING event_id, is_finished",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(event_id, finished)| (event_id, finished != 0)))
    }

    /// Delete a registration by its update token (registrant-driven
    /// withdrawal). Same contract as [`Self::delete_registration`].
    pub async fn delete_registration_by_update_token(
        &self,
        update_token: &str,
    ) -> Result<Option<(String, bool)>, DatabaseError> {
        let row = sqlx::query_as::<_, (String, i64)>(
            "DELETE FROM registrations WHERE update_token = ? RETURNING event_id, is_finished",
        )
        .bind(update_token)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(event_id, finished)| (event_id, finished != 0)))
    }

    /// Delete unfinished registrations created before `cutoff_ms`, freeing
    /// the capacity they held. Idempotent; returns the number reaped.
    pub async fn reap_unfinished_registrations(
        &self,
        cutoff_ms: i64,
    ) -> Result<u64, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM registrations WHERE is_finished = 0 AND created_at < ?")
                .bind(cutoff_ms)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected())
    }

    /// Count finished registrations for an event.
    pub async fn count_finished_registrations(&self, event_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM registrations WHERE event_id = ? AND is_finished = 1",
        )
        .bind(event_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Insert a finished registration directly, bypassing the claim-token
    /// flow. Test-only seam for exercising the admission calculator against
    /// known creation orders.
    #[cfg(test)]
    pub async fn insert_finished_registration(
        &self,
        id: &str,
        event_id: &str,
        quota_id: &str,
        created_at: i64,
    ) -> Result<Registration, DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO registrations (id, event_id, quota_id, is_finished, update_token, created_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ",
        )
        .bind(id)
        .bind(event_id)
        .bind(quota_id)
        .bind(format!("ut-{id}"))
        .bind(created_at)
        .execute(self.pool())
        .await?;

        self.get_registration(id).await
    }
}

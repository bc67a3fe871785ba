//! Event and quota queries for the Gateline capacity store.

use gateline_core::db::unix_timestamp_ms;

use super::db::{Database, DatabaseError};
use super::models::{Event, Quota, Registration};

/// Parameters for creating an event.
pub struct EventParams<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub event_start_at: i64,
    pub event_end_at: i64,
    pub registration_start_at: i64,
    pub registration_end_at: i64,
    pub open_quota_size: i64,
    pub draft: bool,
}

/// Parameters for creating a quota.
pub struct QuotaParams<'a> {
    pub id: &'a str,
    pub event_id: &'a str,
    pub title: &'a str,
    pub position: i64,
    pub size: i64,
}

impl Database {
    // =========================================================================
    // Event queries
    // =========================================================================

    /// Create a new event after validating its time/capacity invariants.
    pub async fn create_event(&self, params: &EventParams<'_>) -> Result<Event, DatabaseError> {
        if params.open_quota_size < 0 {
            return Err(DatabaseError::Constraint(
                "open_quota_size must be non-negative".to_string(),
            ));
        }
        if params.event_start_at > params.event_end_at {
            return Err(DatabaseError::Constraint(
                "event_start_at must not be after event_end_at".to_string(),
            ));
        }
        if params.registration_start_at > params.registration_end_at {
            return Err(DatabaseError::Constraint(
                "registration_start_at must not be after registration_end_at".to_string(),
            ));
        }
        if params.registration_end_at >= params.event_start_at {
            return Err(DatabaseError::Constraint(
                "registration_end_at must be before event_start_at".to_string(),
            ));
        }

        let now = unix_timestamp_ms();

        sqlx::query(
            r"
            INSERT INTO events (
                id, title, event_start_at, event_end_at,
                registration_start_at, registration_end_at,
                open_quota_size, draft, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.title)
        .bind(params.event_start_at)
        .bind(params.event_end_at)
        .bind(params.registration_start_at)
        .bind(params.registration_end_at)
        .bind(params.open_quota_size)
        .bind(i64::from(params.draft))
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_event(params.id).await
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Event, DatabaseError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Event {id}")))
    }

    /// Delete an event (quotas, registrations, and tokens cascade).
    /// Deleting an absent event is a no-op.
    pub async fn delete_event(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Quota queries
    // =========================================================================

    /// Create a new quota for an event.
    pub async fn create_quota(&self, params: &QuotaParams<'_>) -> Result<Quota, DatabaseError> {
        if params.size <= 0 {
            return Err(DatabaseError::Constraint(
                "quota size must be positive".to_string(),
            ));
        }
        if params.position < 0 {
            return Err(DatabaseError::Constraint(
                "quota position must be non-negative".to_string(),
            ));
        }

        let now = unix_timestamp_ms();

        sqlx::query(
            r"
            INSERT INTO quotas (id, event_id, title, position, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.event_id)
        .bind(params.title)
        .bind(params.position)
        .bind(params.size)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_quota(params.id).await
    }

    /// Get a quota by ID.
    pub async fn get_quota(&self, id: &str) -> Result<Quota, DatabaseError> {
        sqlx::query_as::<_, Quota>("SELECT * FROM quotas WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Quota {id}")))
    }

    /// List an event's quotas in display order.
    pub async fn list_quotas(&self, event_id: &str) -> Result<Vec<Quota>, DatabaseError> {
        let quotas = sqlx::query_as::<_, Quota>(
            "SELECT * FROM quotas WHERE event_id = ? ORDER BY position, id",
        )
        .bind(event_id)
        .fetch_all(self.pool())
        .await?;

        Ok(quotas)
    }

    /// Delete a quota (its registrations cascade). Idempotent.
    pub async fn delete_quota(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM quotas WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Admission snapshot
    // =========================================================================

    /// Load everything the admission calculator needs for one event in a
    /// single transaction, so the calculator always sees one consistent
    /// snapshot: the event, its quotas in display order, and its finished
    /// registrations in `(created_at, id)` order.
    pub async fn load_admission_inputs(
        &self,
        event_id: &str,
    ) -> Result<(Event, Vec<Quota>, Vec<Registration>), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Event {event_id}")))?;

        let quotas = sqlx::query_as::<_, Quota>(
            "SELECT * FROM quotas WHERE event_id = ? ORDER BY position, id",
        )
        .bind(event_id)
        .fetch_all(&mut *tx)
        .await?;

        let registrations = sqlx::query_as::<_, Registration>(
            r"
            SELECT * FROM registrations
            WHERE event_id = ? AND is_finished = 1
            ORDER BY created_at, id
            ",
        )
        .bind(event_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((event, quotas, registrations))
    }
}

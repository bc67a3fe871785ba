//! Engine facade.
//!
//! The operations the surrounding (out-of-scope) UI/API layer calls:
//! claiming tokens, exchanging them for provisional registrations,
//! finishing and withdrawing registrations, querying and subscribing to
//! admission status, and event/quota pass-throughs for the external
//! management layer. Admission-affecting writes happen in single atomic
//! statements or one transaction in the store, and every status read is a
//! fresh recomputation over one consistent snapshot.

use std::time::Duration;

use tracing::{debug, info, warn};

use gateline_core::Config;
use gateline_core::config::{ClaimConfig, ExpiryConfig};
use gateline_core::db::unix_timestamp_ms;

use crate::admission::{self, AdmissionRecord};
use crate::error::EngineError;
use crate::feed::{AdmissionSnapshot, FeedHub};
use crate::storage::{
    Database, Event, EventParams, Participant, Quota, QuotaParams, Registration,
};
use crate::tokens::{
    self, ClaimedToken, RateLimitDecision, RateLimitKey, RateLimiter, SqliteRateLimiter,
};

/// The admission engine: capacity store, claim tokens, rate limiting, and
/// the live status feed behind one API.
#[derive(Clone)]
pub struct Engine<L: RateLimiter = SqliteRateLimiter> {
    db: Database,
    limiter: L,
    feed: FeedHub,
    claims: ClaimConfig,
    expiry: ExpiryConfig,
}

impl Engine {
    /// Build an engine with the default database-backed rate limiter.
    pub fn new(db: Database, config: &Config) -> Self {
        let limiter = SqliteRateLimiter::new(db.clone());
        Self::with_rate_limiter(db, limiter, config)
    }
}

impl<L: RateLimiter> Engine<L> {
    /// Build an engine with a caller-supplied rate limiter (e.g. one backed
    /// by an external key-value store).
    pub fn with_rate_limiter(db: Database, limiter: L, config: &Config) -> Self {
        Self {
            db,
            limiter,
            feed: FeedHub::new(config.daemon.feed_capacity),
            claims: config.claims.clone(),
            expiry: config.expiry.clone(),
        }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Claim flow
    // =========================================================================

    /// Issue a single-use claim token for `(event_id, quota_id)`, counted
    /// against the client's rate-limit key. The returned secret is never
    /// retrievable again.
    pub async fn claim_token(
        &self,
        event_id: &str,
        quota_id: &str,
        client_identity: &str,
    ) -> Result<ClaimedToken, EngineError> {
        let event = self.db.get_event(event_id).await?;
        let quota = self.db.get_quota(quota_id).await?;
        if quota.event_id != event.id {
            return Err(EngineError::Validation(format!(
                "quota {quota_id} does not belong to event {event_id}"
            )));
        }

        let now = unix_timestamp_ms();
        if event.draft != 0 {
            return Err(EngineError::Validation(
                "event is not published".to_string(),
            ));
        }
        if now < event.registration_start_at {
            return Err(EngineError::Validation(
                "registration has not opened".to_string(),
            ));
        }
        if now > event.registration_end_at {
            return Err(EngineError::Validation(
                "registration has closed".to_string(),
            ));
        }

        let key = RateLimitKey {
            event_id: event_id.to_string(),
            quota_id: Some(quota_id.to_string()),
            client_identity: client_identity.to_string(),
        };
        let decision = self
            .limiter
            .increment_and_check(
                &key,
                self.claims.rate_limit_max_claims,
                self.claims.rate_limit_window(),
            )
            .await?;
        if let RateLimitDecision::Denied { retry_after } = decision {
            // Expected outcome under load, not a system failure
            debug!(
                event_id = %event_id,
                client_identity = %client_identity,
                retry_after = ?retry_after,
                "Claim throttled"
            );
            return Err(EngineError::RateLimited { retry_after });
        }

        let secret = tokens::generate_secret();
        let token_id = uuid::Uuid::new_v4().to_string();
        let token = self
            .db
            .create_claim_token(
                &token_id,
                event_id,
                quota_id,
                &tokens::hash_secret(&secret),
                client_identity,
            )
            .await?;

        debug!(event_id = %event_id, quota_id = %quota_id, token_id = %token.id, "Claim token issued");

        Ok(ClaimedToken {
            token_id: token.id,
            secret,
        })
    }

    /// Exchange a claim-token secret for a provisional (unfinished)
    /// registration. Fails with `InvalidToken` if the token is missing,
    /// expired, or already consumed; under concurrent consumption of the
    /// same secret exactly one caller wins.
    pub async fn create_provisional_registration(
        &self,
        secret: &str,
        participant: Option<&Participant>,
    ) -> Result<Registration, EngineError> {
        let issued_after = unix_timestamp_ms() - self.claim_token_timeout_ms();
        let registration_id = uuid::Uuid::new_v4().to_string();
        let update_token = tokens::generate_secret();

        let registration = self
            .db
            .consume_claim_token(
                &tokens::hash_secret(secret),
                issued_after,
                &registration_id,
                &update_token,
                participant,
            )
            .await?
            .ok_or(EngineError::InvalidToken)?;

        debug!(
            registration_id = %registration.id,
            event_id = %registration.event_id,
            "Provisional registration created"
        );

        Ok(registration)
    }

    // =========================================================================
    // Registration lifecycle
    // =========================================================================

    /// Mark a registration finished. Releases the registrant's rate-limit
    /// key (so registering a second person from the same address is not
    /// penalized) and pushes a fresh snapshot to subscribers.
    pub async fn finish_registration(
        &self,
        registration_id: &str,
        participant: &Participant,
    ) -> Result<Registration, EngineError> {
        let updated = self
            .db
            .finish_registration(registration_id, participant)
            .await?;
        if !updated {
            return Err(EngineError::NotFound(format!(
                "Registration {registration_id}"
            )));
        }

        let registration = self.db.get_registration(registration_id).await?;

        if let Some(client_identity) = &registration.client_identity {
            let key = RateLimitKey {
                event_id: registration.event_id.clone(),
                quota_id: Some(registration.quota_id.clone()),
                client_identity: client_identity.clone(),
            };
            if let Err(e) = self.limiter.release(&key).await {
                warn!(error = %e, "Failed to release rate-limit key on finish");
            }
        }

        info!(
            registration_id = %registration.id,
            event_id = %registration.event_id,
            "Registration finished"
        );

        self.publish_event(&registration.event_id).await;

        Ok(registration)
    }

    /// Delete a registration by ID (withdrawal or administrative removal).
    /// Deleting an absent registration is an idempotent success.
    pub async fn delete_registration(&self, registration_id: &str) -> Result<(), EngineError> {
        if let Some((event_id, was_finished)) =
            self.db.delete_registration(registration_id).await?
        {
            info!(registration_id = %registration_id, event_id = %event_id, "Registration deleted");
            if was_finished {
                self.publish_event(&event_id).await;
            }
        }
        Ok(())
    }

    /// Delete a registration by its update token (registrant-driven
    /// withdrawal without knowing the row id). Idempotent.
    pub async fn delete_registration_by_update_token(
        &self,
        update_token: &str,
    ) -> Result<(), EngineError> {
        if let Some((event_id, was_finished)) = self
            .db
            .delete_registration_by_update_token(update_token)
            .await?
        {
            info!(event_id = %event_id, "Registration withdrawn via update token");
            if was_finished {
                self.publish_event(&event_id).await;
            }
        }
        Ok(())
    }

    pub async fn get_registration(
        &self,
        registration_id: &str,
    ) -> Result<Registration, EngineError> {
        Ok(self.db.get_registration(registration_id).await?)
    }

    // =========================================================================
    // Admission status
    // =========================================================================

    /// Compute the current admission status for every finished registration
    /// of an event. Always recomputed from the store; never cached.
    pub async fn admission_status(
        &self,
        event_id: &str,
    ) -> Result<Vec<AdmissionRecord>, EngineError> {
        let (event, quotas, registrations) = self.db.load_admission_inputs(event_id).await?;
        Ok(admission::classify(
            event.open_quota_size,
            &quotas,
            &registrations,
        ))
    }

    /// Subscribe to admission snapshots for an event. A snapshot is pushed
    /// whenever a finished registration appears or disappears.
    pub async fn subscribe(
        &self,
        event_id: &str,
    ) -> tokio::sync::broadcast::Receiver<AdmissionSnapshot> {
        self.feed.subscribe(event_id).await
    }

    /// Recompute and push the event's snapshot. Publish failures only mean
    /// nobody is listening; admission state lives in the store either way.
    async fn publish_event(&self, event_id: &str) {
        match self.admission_status(event_id).await {
            Ok(records) => {
                self.feed
                    .publish(AdmissionSnapshot {
                        event_id: event_id.to_string(),
                        generated_at: unix_timestamp_ms(),
                        records,
                    })
                    .await;
            }
            Err(EngineError::NotFound(_)) => {
                // Event deleted between the mutation and the publish
            }
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to compute snapshot for feed");
            }
        }
    }

    // =========================================================================
    // Event/quota pass-throughs (external management layer)
    // =========================================================================

    pub async fn create_event(&self, params: &EventParams<'_>) -> Result<Event, EngineError> {
        Ok(self.db.create_event(params).await?)
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Event, EngineError> {
        Ok(self.db.get_event(event_id).await?)
    }

    /// Delete an event and everything under it. Idempotent.
    pub async fn delete_event(&self, event_id: &str) -> Result<(), EngineError> {
        self.db.delete_event(event_id).await?;
        self.feed.forget(event_id).await;
        Ok(())
    }

    pub async fn create_quota(&self, params: &QuotaParams<'_>) -> Result<Quota, EngineError> {
        Ok(self.db.create_quota(params).await?)
    }

    pub async fn list_quotas(&self, event_id: &str) -> Result<Vec<Quota>, EngineError> {
        Ok(self.db.list_quotas(event_id).await?)
    }

    /// Delete a quota; its registrations cascade away, so subscribers get a
    /// fresh snapshot. Idempotent.
    pub async fn delete_quota(&self, quota_id: &str) -> Result<(), EngineError> {
        let event_id = match self.db.get_quota(quota_id).await {
            Ok(quota) => quota.event_id,
            Err(gateline_core::db::DatabaseError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if self.db.delete_quota(quota_id).await? {
            self.publish_event(&event_id).await;
        }
        Ok(())
    }

    // =========================================================================
    // Expiry sweeps (driven by the workers or an external scheduler)
    // =========================================================================

    /// Delete unfinished registrations older than the configured timeout.
    pub async fn reap_unfinished_registrations(&self) -> Result<u64, EngineError> {
        let cutoff = unix_timestamp_ms() - self.registration_timeout_ms();
        Ok(self.db.reap_unfinished_registrations(cutoff).await?)
    }

    /// Delete claim tokens older than the configured timeout.
    pub async fn reap_claim_tokens(&self) -> Result<u64, EngineError> {
        let cutoff = unix_timestamp_ms() - self.claim_token_timeout_ms();
        Ok(self.db.reap_claim_tokens(cutoff).await?)
    }

    /// Delete rate-limit keys whose TTL has elapsed.
    pub async fn reap_rate_limit_keys(&self) -> Result<u64, EngineError> {
        Ok(self
            .db
            .reap_rate_limit_keys(unix_timestamp_ms())
            .await?)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn registration_timeout_ms(&self) -> i64 {
        self.expiry.registration_timeout().as_millis() as i64
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn claim_token_timeout_ms(&self) -> i64 {
        self.expiry.claim_token_timeout().as_millis() as i64
    }
}

/// Convenience alias used by the daemon binary.
pub type DefaultEngine = Engine<SqliteRateLimiter>;

#[cfg(test)]
mod tests {
    use super::*;
    use gateline_core::db::unix_timestamp_ms;

    async fn test_engine() -> DefaultEngine {
        let db = Database::open_in_memory().await.unwrap();
        Engine::new(db, &Config::default())
    }

    fn open_event(id: &str) -> EventParams<'_> {
        let now = unix_timestamp_ms();
        EventParams {
            id,
            title: "Test",
            event_start_at: now + 200_000,
            event_end_at: now + 300_000,
            registration_start_at: now - 1_000,
            registration_end_at: now + 100_000,
            open_quota_size: 1,
            draft: false,
        }
    }

    async fn seed(engine: &DefaultEngine) {
        engine.create_event(&open_event("e1")).await.unwrap();
        engine
            .create_quota(&QuotaParams {
                id: "q1",
                event_id: "e1",
                title: "General",
                position: 0,
                size: 1,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn claim_rejects_draft_event() {
        let engine = test_engine().await;
        let mut params = open_event("e1");
        params.draft = true;
        engine.create_event(&params).await.unwrap();
        engine
            .create_quota(&QuotaParams {
                id: "q1",
                event_id: "e1",
                title: "General",
                position: 0,
                size: 1,
            })
            .await
            .unwrap();

        let err = engine.claim_token("e1", "q1", "ip").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_rejects_closed_registration_window() {
        let engine = test_engine().await;
        let now = unix_timestamp_ms();
        engine
            .create_event(&EventParams {
                id: "e1",
                title: "Past",
                event_start_at: now - 1_000,
                event_end_at: now + 1_000,
                registration_start_at: now - 20_000,
                registration_end_at: now - 10_000,
                open_quota_size: 0,
                draft: false,
            })
            .await
            .unwrap();
        engine
            .create_quota(&QuotaParams {
                id: "q1",
                event_id: "e1",
                title: "General",
                position: 0,
                size: 1,
            })
            .await
            .unwrap();

        let err = engine.claim_token("e1", "q1", "ip").await.unwrap_err();
        let EngineError::Validation(msg) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(msg.contains("closed"));
    }

    #[tokio::test]
    async fn claim_rejects_quota_of_another_event() {
        let engine = test_engine().await;
        seed(&engine).await;
        engine.create_event(&open_event("e2")).await.unwrap();

        let err = engine.claim_token("e2", "q1", "ip").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_consume_finish_roundtrip() {
        let engine = test_engine().await;
        seed(&engine).await;

        let claimed = engine.claim_token("e1", "q1", "ip").await.unwrap();
        let reg = engine
            .create_provisional_registration(&claimed.secret, None)
            .await
            .unwrap();
        assert_eq!(reg.is_finished, 0);

        // Invisible to admission until finished
        assert!(engine.admission_status("e1").await.unwrap().is_empty());

        let participant = Participant {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
        };
        engine
            .finish_registration(&reg.id, &participant)
            .await
            .unwrap();

        let records = engine.admission_status("e1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].registration_id, reg.id);
    }

    #[tokio::test]
    async fn consuming_a_secret_twice_is_invalid() {
        let engine = test_engine().await;
        seed(&engine).await;

        let claimed = engine.claim_token("e1", "q1", "ip").await.unwrap();
        engine
            .create_provisional_registration(&claimed.secret, None)
            .await
            .unwrap();

        let err = engine
            .create_provisional_registration(&claimed.secret, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidToken));
    }

    #[tokio::test]
    async fn garbage_secret_is_invalid() {
        let engine = test_engine().await;
        seed(&engine).await;

        let err = engine
            .create_provisional_registration("not-a-secret", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidToken));
    }

    #[tokio::test]
    async fn delete_registration_is_idempotent() {
        let engine = test_engine().await;
        seed(&engine).await;

        engine.delete_registration("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn delete_quota_republishes_and_is_idempotent() {
        let engine = test_engine().await;
        seed(&engine).await;

        engine.delete_quota("q1").await.unwrap();
        engine.delete_quota("q1").await.unwrap();
        assert!(engine.list_quotas("e1").await.unwrap().is_empty());
    }
}

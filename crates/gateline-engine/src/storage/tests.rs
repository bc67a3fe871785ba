//! Storage layer tests for the Gateline engine.

use gateline_core::db::unix_timestamp_ms;

use super::db::{Database, DatabaseError};
use super::models::Participant;
use super::queries_events::{EventParams, QuotaParams};

async fn test_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Event with an open registration window and sensible times around `now`.
fn event_params(id: &str) -> EventParams<'_> {
    let now = unix_timestamp_ms();
    EventParams {
        id,
        title: "Test event",
        event_start_at: now + 200_000,
        event_end_at: now + 300_000,
        registration_start_at: now - 1_000,
        registration_end_at: now + 100_000,
        open_quota_size: 2,
        draft: false,
    }
}

async fn seed_event(db: &Database, id: &str) {
    db.create_event(&event_params(id)).await.unwrap();
}

async fn seed_quota(db: &Database, id: &str, event_id: &str, size: i64) {
    db.create_quota(&QuotaParams {
        id,
        event_id,
        title: "General",
        position: 0,
        size,
    })
    .await
    .unwrap();
}

// === Event tests ===

#[tokio::test]
async fn create_and_get_event() {
    let db = test_db().await;
    seed_event(&db, "e1").await;

    let event = db.get_event("e1").await.unwrap();
    assert_eq!(event.id, "e1");
    assert_eq!(event.open_quota_size, 2);
    assert_eq!(event.draft, 0);
}

#[tokio::test]
async fn create_event_rejects_inverted_event_times() {
    let db = test_db().await;
    let mut params = event_params("e1");
    params.event_end_at = params.event_start_at - 1;

    let err = db.create_event(&params).await.unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
    assert!(err.to_string().contains("event_start_at"));
}

#[tokio::test]
async fn create_event_rejects_inverted_registration_times() {
    let db = test_db().await;
    let mut params = event_params("e1");
    params.registration_end_at = params.registration_start_at - 1;

    let err = db.create_event(&params).await.unwrap_err();
    assert!(matches!(err, DatabaseError::Constraint(_)));
}

#[tokio::test]
async fn create_event_rejects_registration_closing_after_event_starts() {
    let db = test_db().await;
    let mut params = event_params("e1");
    params.registration_end_at = params.event_start_at;

    let err = db.create_event(&params).await.unwrap_err();
    assert!(err.to_string().contains("before event_start_at"));
}

#[tokio::test]
async fn create_event_rejects_negative_open_quota() {
    let db = test_db().await;
    let mut params = event_params("e1");
    params.open_quota_size = -1;

    let err = db.create_event(&params).await.unwrap_err();
    assert!(err.to_string().contains("open_quota_size"));
}

#[tokio::test]
async fn delete_event_cascades_and_is_idempotent() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;

    assert!(db.delete_event("e1").await.unwrap());
    assert!(!db.delete_event("e1").await.unwrap());
    assert!(db.get_quota("q1").await.is_err());
}

// === Quota tests ===

#[tokio::test]
async fn create_quota_rejects_nonpositive_size() {
    let db = test_db().await;
    seed_event(&db, "e1").await;

    let err = db
        .create_quota(&QuotaParams {
            id: "q1",
            event_id: "e1",
            title: "Broken",
            position: 0,
            size: 0,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("size must be positive"));
}

#[tokio::test]
async fn create_quota_rejects_negative_position() {
    let db = test_db().await;
    seed_event(&db, "e1").await;

    let err = db
        .create_quota(&QuotaParams {
            id: "q1",
            event_id: "e1",
            title: "Broken",
            position: -1,
            size: 10,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("position"));
}

#[tokio::test]
async fn list_quotas_ordered_by_position() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    db.create_quota(&QuotaParams {
        id: "q2",
        event_id: "e1",
        title: "Second",
        position: 1,
        size: 5,
    })
    .await
    .unwrap();
    db.create_quota(&QuotaParams {
        id: "q1",
        event_id: "e1",
        title: "First",
        position: 0,
        size: 5,
    })
    .await
    .unwrap();

    let quotas = db.list_quotas("e1").await.unwrap();
    assert_eq!(quotas.len(), 2);
    assert_eq!(quotas[0].id, "q1");
    assert_eq!(quotas[1].id, "q2");
}

// === Claim token tests ===

#[tokio::test]
async fn consume_claim_token_creates_bound_registration() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "1.2.3.4")
        .await
        .unwrap();

    let reg = db
        .consume_claim_token("hash1", 0, "r1", "ut1", None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reg.id, "r1");
    assert_eq!(reg.event_id, "e1");
    assert_eq!(reg.quota_id, "q1");
    assert_eq!(reg.is_finished, 0);
    assert_eq!(reg.client_identity.as_deref(), Some("1.2.3.4"));

    let token = db.get_claim_token("t1").await.unwrap();
    assert_eq!(token.used, 1);
}

#[tokio::test]
async fn consume_claim_token_twice_fails_second_time() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();

    assert!(db
        .consume_claim_token("hash1", 0, "r1", "ut1", None)
        .await
        .unwrap()
        .is_some());
    assert!(db
        .consume_claim_token("hash1", 0, "r2", "ut2", None)
        .await
        .unwrap()
        .is_none());

    // Only the winner's registration exists
    assert!(db.get_registration("r1").await.is_ok());
    assert!(db.get_registration("r2").await.is_err());
}

#[tokio::test]
async fn consume_expired_claim_token_is_rejected() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();

    // Cutoff in the future makes every existing token look expired
    let cutoff = unix_timestamp_ms() + 60_000;
    assert!(db
        .consume_claim_token("hash1", cutoff, "r1", "ut1", None)
        .await
        .unwrap()
        .is_none());

    // Token stays unused so the reaper sees it
    assert_eq!(db.get_claim_token("t1").await.unwrap().used, 0);
}

#[tokio::test]
async fn reap_claim_tokens_is_idempotent() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();

    let cutoff = unix_timestamp_ms() + 1;
    assert_eq!(db.reap_claim_tokens(cutoff).await.unwrap(), 1);
    assert_eq!(db.reap_claim_tokens(cutoff).await.unwrap(), 0);
}

// === Registration tests ===

#[tokio::test]
async fn finish_registration_sets_participant_and_keeps_created_at() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();
    let reg = db
        .consume_claim_token("hash1", 0, "r1", "ut1", None)
        .await
        .unwrap()
        .unwrap();

    let participant = Participant {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
    };
    assert!(db.finish_registration("r1", &participant).await.unwrap());

    let finished = db.get_registration("r1").await.unwrap();
    assert_eq!(finished.is_finished, 1);
    assert_eq!(finished.email.as_deref(), Some("ada@example.com"));
    assert_eq!(finished.created_at, reg.created_at);

    assert_eq!(db.count_finished_registrations("e1").await.unwrap(), 1);
}

#[tokio::test]
async fn finish_missing_registration_returns_false() {
    let db = test_db().await;
    let participant = Participant::default();
    assert!(!db.finish_registration("nope", &participant).await.unwrap());
}

#[tokio::test]
async fn delete_registration_reports_finished_state() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.insert_finished_registration("r1", "e1", "q1", 100)
        .await
        .unwrap();

    let deleted = db.delete_registration("r1").await.unwrap();
    assert_eq!(deleted, Some(("e1".to_string(), true)));

    // Idempotent
    assert_eq!(db.delete_registration("r1").await.unwrap(), None);
}

#[tokio::test]
async fn delete_registration_by_update_token() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();
    db.consume_claim_token("hash1", 0, "r1", "secret-ut", None)
        .await
        .unwrap();

    let deleted = db
        .delete_registration_by_update_token("secret-ut")
        .await
        .unwrap();
    assert_eq!(deleted, Some(("e1".to_string(), false)));
    assert!(db.get_registration("r1").await.is_err());
}

#[tokio::test]
async fn reap_unfinished_registrations_spares_finished_ones() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;

    db.insert_finished_registration("r-done", "e1", "q1", 100)
        .await
        .unwrap();
    db.create_claim_token("t1", "e1", "q1", "hash1", "ip")
        .await
        .unwrap();
    db.consume_claim_token("hash1", 0, "r-pending", "ut1", None)
        .await
        .unwrap();

    let cutoff = unix_timestamp_ms() + 1;
    assert_eq!(db.reap_unfinished_registrations(cutoff).await.unwrap(), 1);
    assert_eq!(db.reap_unfinished_registrations(cutoff).await.unwrap(), 0);

    assert!(db.get_registration("r-done").await.is_ok());
    assert!(db.get_registration("r-pending").await.is_err());
}

// === Rate limit tests ===

#[tokio::test]
async fn rate_limit_counter_increments_within_window() {
    let db = test_db().await;

    let (c1, exp1) = db
        .increment_rate_limit("e1", Some("q1"), "ip", 1_000, 500)
        .await
        .unwrap();
    assert_eq!(c1, 1);
    assert_eq!(exp1, 1_500);

    let (c2, exp2) = db
        .increment_rate_limit("e1", Some("q1"), "ip", 1_100, 500)
        .await
        .unwrap();
    assert_eq!(c2, 2);
    // Window end does not move while the key is live
    assert_eq!(exp2, 1_500);
}

#[tokio::test]
async fn rate_limit_counter_resets_after_window() {
    let db = test_db().await;

    db.increment_rate_limit("e1", Some("q1"), "ip", 1_000, 500)
        .await
        .unwrap();
    db.increment_rate_limit("e1", Some("q1"), "ip", 1_100, 500)
        .await
        .unwrap();

    let (count, expires_at) = db
        .increment_rate_limit("e1", Some("q1"), "ip", 2_000, 500)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(expires_at, 2_500);
}

#[tokio::test]
async fn rate_limit_keys_are_isolated_per_identity() {
    let db = test_db().await;

    db.increment_rate_limit("e1", Some("q1"), "alice", 1_000, 500)
        .await
        .unwrap();
    let (count, _) = db
        .increment_rate_limit("e1", Some("q1"), "bob", 1_000, 500)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn release_and_reap_rate_limit_keys() {
    let db = test_db().await;

    db.increment_rate_limit("e1", Some("q1"), "ip", 1_000, 500)
        .await
        .unwrap();
    assert!(db.release_rate_limit("e1", Some("q1"), "ip").await.unwrap());
    assert!(!db.release_rate_limit("e1", Some("q1"), "ip").await.unwrap());

    db.increment_rate_limit("e1", None, "ip", 1_000, 500)
        .await
        .unwrap();
    assert_eq!(db.reap_rate_limit_keys(1_500).await.unwrap(), 1);
    assert_eq!(db.reap_rate_limit_keys(1_500).await.unwrap(), 0);
}

// === Admission snapshot ===

#[tokio::test]
async fn load_admission_inputs_orders_registrations() {
    let db = test_db().await;
    seed_event(&db, "e1").await;
    seed_quota(&db, "q1", "e1", 5).await;

    // Same timestamp: id breaks the tie
    db.insert_finished_registration("rb", "e1", "q1", 300)
        .await
        .unwrap();
    db.insert_finished_registration("ra", "e1", "q1", 300)
        .await
        .unwrap();
    db.insert_finished_registration("rc", "e1", "q1", 100)
        .await
        .unwrap();

    let (event, quotas, regs) = db.load_admission_inputs("e1").await.unwrap();
    assert_eq!(event.id, "e1");
    assert_eq!(quotas.len(), 1);
    let ids: Vec<&str> = regs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["rc", "ra", "rb"]);
}

#[tokio::test]
async fn load_admission_inputs_missing_event_is_not_found() {
    let db = test_db().await;
    let err = db.load_admission_inputs("ghost").await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

//! Data models for Gateline engine storage.

use serde::{Deserialize, Serialize};

/// Event record from the database. Time fields are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub event_start_at: i64,
    pub event_end_at: i64,
    pub registration_start_at: i64,
    pub registration_end_at: i64,
    pub open_quota_size: i64,
    pub draft: i64,
    pub created_at: i64,
}

/// Quota record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quota {
    pub id: String,
    pub event_id: String,
    pub title: String,
    pub position: i64,
    pub size: i64,
    pub created_at: i64,
}

/// Registration record from the database.
///
/// `created_at` is immutable after insert; it is the sole ordering key for
/// admission (ties broken by `id`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub quota_id: String,
    pub is_finished: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub client_identity: Option<String>,
    pub update_token: String,
    pub created_at: i64,
}

/// Claim token record from the database. Holds only the secret's hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimToken {
    pub id: String,
    pub event_id: String,
    pub quota_id: String,
    pub secret_hash: String,
    pub client_identity: String,
    pub used: i64,
    pub created_at: i64,
}

/// Participant fields captured on a registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Participant {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

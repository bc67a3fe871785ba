//! Admission calculator.
//!
//! Classifies every finished registration of an event into one of three
//! statuses and assigns it a 1-based position:
//!
//! 1. Each quota seats the first `size` of its registrations in creation
//!    order (`InQuota`, positions counted within the quota).
//! 2. The remainder across all quotas compete, in event-global creation
//!    order, for the event's shared open pool of `open_quota_size` seats
//!    (`InOpenQuota`, positions counted within the pool).
//! 3. Everyone else queues (`InQueue`), positioned in event-global creation
//!    order across quotas -- a quota's first queued entrant can be position
//!    4 if three registrations from other quotas overflowed ahead of it.
//!
//! The classification is a pure function of the current snapshot. It is
//! recomputed on every query and never maintained as stored counters, so
//! concurrent inserts and deletes cannot leave a stale seat count behind;
//! creation ordering is total (`created_at`, then `id`).

use std::collections::HashMap;

use serde::Serialize;

use crate::storage::{Quota, Registration};

/// Where a finished registration currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    /// Seated in the quota's own capacity.
    InQuota,
    /// Seated in the event-wide shared open pool.
    InOpenQuota,
    /// Waitlisted.
    InQueue,
}

impl AdmissionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InQuota => "IN_QUOTA",
            Self::InOpenQuota => "IN_OPEN_QUOTA",
            Self::InQueue => "IN_QUEUE",
        }
    }
}

/// Derived admission state for one registration. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionRecord {
    pub registration_id: String,
    pub quota_id: String,
    pub status: AdmissionStatus,
    pub position: i64,
}

/// Classify an event's finished registrations.
///
/// Input order does not matter; the function sorts by `(created_at, id)`
/// itself. Registrations referencing a quota not in `quotas` go straight to
/// the overflow stages (the store's foreign keys make this unreachable in
/// practice). Output preserves the global creation order.
pub fn classify(
    open_quota_size: i64,
    quotas: &[Quota],
    registrations: &[Registration],
) -> Vec<AdmissionRecord> {
    let mut ordered: Vec<&Registration> = registrations.iter().collect();
    ordered.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

    let mut seats_left: HashMap<&str, i64> =
        quotas.iter().map(|q| (q.id.as_str(), q.size)).collect();
    let mut quota_rank: HashMap<&str, i64> = HashMap::new();

    let mut records = Vec::with_capacity(ordered.len());
    let mut overflow: Vec<&Registration> = Vec::new();

    // Stage 1: per-quota seats, walked in global order so each quota sees
    // its own registrations in creation order.
    for reg in ordered {
        let left = seats_left.get_mut(reg.quota_id.as_str());
        match left {
            Some(left) if *left > 0 => {
                *left -= 1;
                let rank = quota_rank.entry(reg.quota_id.as_str()).or_insert(0);
                *rank += 1;
                records.push(AdmissionRecord {
                    registration_id: reg.id.clone(),
                    quota_id: reg.quota_id.clone(),
                    status: AdmissionStatus::InQuota,
                    position: *rank,
                });
            }
            _ => overflow.push(reg),
        }
    }

    // Stages 2 and 3: the overflow list is already in global creation order.
    // The open pool is one shared resource for the whole event, and queue
    // positions continue across quotas rather than restarting per quota.
    for (idx, reg) in overflow.into_iter().enumerate() {
        let idx = i64::try_from(idx).unwrap_or(i64::MAX);
        let (status, position) = if idx < open_quota_size {
            (AdmissionStatus::InOpenQuota, idx + 1)
        } else {
            (AdmissionStatus::InQueue, idx - open_quota_size + 1)
        };
        records.push(AdmissionRecord {
            registration_id: reg.id.clone(),
            quota_id: reg.quota_id.clone(),
            status,
            position,
        });
    }

    records
}

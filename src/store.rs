// =============================================================================
// store.rs — THE PERSISTENT MEMORY OF THE OPERATION
// =============================================================================
//
// The web app owns the real database; the engine just needs four verbs:
// read the active docket (oldest-checked-first), write a case's synced
// fields back, append a change event, and append a delivery-log entry.
// Those four verbs are the CaseStore trait, and everything above this file
// talks to the trait — the pipeline neither knows nor cares that the
// production implementation is Redis.
//
// The Redis layout:
//   {prefix}:cases              HASH   case id -> TrackedCase JSON
//   {prefix}:active_by_checked  ZSET   case id scored by last_checked_at
//   {prefix}:events             ZSET   ChangeEvent JSON scored by detected_at
//   {prefix}:deliveries         ZSET   DeliveryRecord JSON scored by attempted_at
//
// The active_by_checked sorted set IS the scheduling policy: ZRANGE from
// the bottom hands back the cases that have waited longest, so a run that
// hits its deadline mid-batch simply resumes fairness next cycle. Never-
// checked cases score 0 and jump the queue, which is exactly what a user
// who just added a case would hope for.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{ChangeEvent, TrackedCase};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// Audit record for one notification delivery attempt. Appended, never
/// mutated — the audit trail is a diary, not a whiteboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub event_id: String,
    pub case_id: String,
    pub user_id: String,
    /// Which transport: "pubsub", "telegram", "email", ...
    pub channel: String,
    pub outcome: DeliveryOutcome,
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// The four verbs the engine needs from persistence.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Every active tracked case, oldest-checked first. This read failing
    /// is the ONE fatal condition for a pipeline run.
    async fn active_cases_oldest_first(&self) -> Result<Vec<TrackedCase>, StoreError>;

    /// Write back a case's synced fields + bookkeeping timestamps.
    async fn update_case(&self, case: &TrackedCase) -> Result<(), StoreError>;

    /// Append one change event to the audit trail.
    async fn append_change_event(&self, event: &ChangeEvent) -> Result<(), StoreError>;

    /// Append one delivery-log record.
    async fn append_delivery_record(&self, record: &DeliveryRecord) -> Result<(), StoreError>;
}

/// The Redis-backed store.
pub struct RedisCaseStore {
    con: redis::aio::ConnectionManager,
    cases_key: String,
    index_key: String,
    events_key: String,
    deliveries_key: String,
}

impl RedisCaseStore {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let con = client.get_connection_manager().await?;
        info!(url = %config.redis_url, "case store connected — the docket is within reach");
        let prefix = &config.redis_key_prefix;
        Ok(Self {
            con,
            cases_key: format!("{prefix}:cases"),
            index_key: format!("{prefix}:active_by_checked"),
            events_key: format!("{prefix}:events"),
            deliveries_key: format!("{prefix}:deliveries"),
        })
    }

    fn checked_score(case: &TrackedCase) -> f64 {
        case.last_checked_at
            .map(|ts| ts.timestamp() as f64)
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl CaseStore for RedisCaseStore {
    async fn active_cases_oldest_first(&self) -> Result<Vec<TrackedCase>, StoreError> {
        let mut con = self.con.clone();
        let ids: Vec<String> = con.zrange(&self.index_key, 0, -1).await?;
        debug!(count = ids.len(), "store: active case ids loaded");

        let mut cases = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = con.hget(&self.cases_key, &id).await?;
            let Some(raw) = raw else {
                // Index points at a deleted case — a user hard-deleted it
                // between cycles. Tidy the index and move on.
                let _: () = con.zrem(&self.index_key, &id).await?;
                continue;
            };
            let case: TrackedCase = serde_json::from_str(&raw)?;
            if case.active {
                cases.push(case);
            }
        }
        Ok(cases)
    }

    async fn update_case(&self, case: &TrackedCase) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = serde_json::to_string(case)?;
        let _: () = con.hset(&self.cases_key, &case.id, json).await?;
        if case.active {
            let _: () = con
                .zadd(&self.index_key, &case.id, Self::checked_score(case))
                .await?;
        } else {
            // Soft-deleted cases leave the polling queue immediately.
            let _: () = con.zrem(&self.index_key, &case.id).await?;
        }
        Ok(())
    }

    async fn append_change_event(&self, event: &ChangeEvent) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = serde_json::to_string(event)?;
        let score = event.detected_at.timestamp() as f64;
        let _: () = con.zadd(&self.events_key, json, score).await?;
        Ok(())
    }

    async fn append_delivery_record(&self, record: &DeliveryRecord) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let json = serde_json::to_string(record)?;
        let score = record.attempted_at.timestamp() as f64;
        let _: () = con.zadd(&self.deliveries_key, json, score).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseIdentifier, CourtCategory};

    #[test]
    fn tracked_case_survives_the_wire_format() {
        let identifier = CaseIdentifier {
            category: CourtCategory::HighCourt,
            case_type: "W.P.(C)".into(),
            type_code: None,
            case_number: "8812".into(),
            case_year: "2022".into(),
            cnr: Some("KLHC010012342022".into()),
            court_code: None,
            state_code: Some("13".into()),
            district_code: None,
        };
        let mut case = TrackedCase::new("case-1".into(), "user-1".into(), identifier);
        case.status = "Pending".into();
        case.last_checked_at = Some(Utc::now());
        case.tags = vec!["important".into()];

        let json = serde_json::to_string(&case).unwrap();
        let back: TrackedCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn checked_score_orders_never_checked_first() {
        let identifier = CaseIdentifier {
            category: CourtCategory::DistrictCourt,
            case_type: "O.S.".into(),
            type_code: None,
            case_number: "1".into(),
            case_year: "2023".into(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        };
        let fresh = TrackedCase::new("a".into(), "u".into(), identifier.clone());
        let mut seasoned = TrackedCase::new("b".into(), "u".into(), identifier);
        seasoned.last_checked_at = Some(Utc::now());

        assert_eq!(RedisCaseStore::checked_score(&fresh), 0.0);
        assert!(RedisCaseStore::checked_score(&seasoned) > 0.0);
    }

    #[test]
    fn delivery_outcome_wire_names() {
        assert_eq!(
            serde_json::to_string(&DeliveryOutcome::Sent).unwrap(),
            "\"sent\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryOutcome::Failed).unwrap(),
            "\"failed\""
        );
    }
}

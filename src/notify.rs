// =============================================================================
// notify.rs — THE TOWN CRIER
// =============================================================================
//
// Change events leave the engine through here. The dispatcher publishes
// each event to a Redis pub/sub channel — the web app subscribes on the
// other end and fans out to whatever channels the user configured
// (chat bot, email, carrier pigeon; transports are not our department).
//
// Two promises this module keeps:
//
// 1. Every dispatch attempt leaves a delivery record in the audit log,
//    sent or failed. When a user asks "why didn't I hear about my
//    hearing", the answer is a ZRANGE away, not a shrug.
//
// 2. Dispatch never throws. A dead Redis connection downgrades a
//    notification to a logged failure; it does not abort the pipeline
//    run that produced it. The event itself is already persisted by the
//    pipeline before dispatch is attempted, so nothing is lost — only
//    delayed until the subscriber catches up on the event log.
// =============================================================================

use async_trait::async_trait;
use chrono::Utc;
use portable_atomic::{AtomicU64, Ordering};
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::ChangeEvent;
use crate::store::{CaseStore, DeliveryOutcome, DeliveryRecord, StoreError};

/// The dispatch seam: the pipeline hands events to this trait, tests hand
/// it a fake, production hands it Redis.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event to every configured channel. Infallible by
    /// contract — failures are recorded and logged, not raised.
    async fn dispatch(&self, event: &ChangeEvent);
}

/// Dispatcher statistics, all atomic, all lock-free, all slightly smug
/// about it.
#[derive(Default)]
pub struct DispatcherStats {
    pub events_dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

/// A serializable snapshot for the metrics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatcherSnapshot {
    pub events_dispatched: u64,
    pub dispatch_failures: u64,
}

/// The production dispatcher: Redis pub/sub out the front, delivery
/// records out the back.
pub struct RedisNotificationDispatcher {
    con: redis::aio::ConnectionManager,
    channel: String,
    store: Arc<dyn CaseStore>,
    stats: Arc<DispatcherStats>,
}

impl RedisNotificationDispatcher {
    pub async fn connect(config: &Config, store: Arc<dyn CaseStore>) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let con = client.get_connection_manager().await?;
        info!(channel = %config.redis_channel, "notification dispatcher connected — the void is listening");
        Ok(Self {
            con,
            channel: config.redis_channel.clone(),
            store,
            stats: Arc::new(DispatcherStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<DispatcherStats> {
        self.stats.clone()
    }

    pub fn snapshot(stats: &DispatcherStats) -> DispatcherSnapshot {
        DispatcherSnapshot {
            events_dispatched: stats.events_dispatched.load(Ordering::Relaxed),
            dispatch_failures: stats.dispatch_failures.load(Ordering::Relaxed),
        }
    }

    async fn record(&self, event: &ChangeEvent, outcome: DeliveryOutcome, detail: Option<String>) {
        let record = DeliveryRecord {
            event_id: event.id.clone(),
            case_id: event.case_id.clone(),
            user_id: event.user_id.clone(),
            channel: "pubsub".to_string(),
            outcome,
            detail,
            attempted_at: Utc::now(),
        };
        if let Err(e) = self.store.append_delivery_record(&record).await {
            // The audit trail failing is worth shouting about, but still
            // not worth aborting a batch over.
            error!(error = %e, event_id = %event.id, "failed to append delivery record");
        }
    }
}

#[async_trait]
impl Notifier for RedisNotificationDispatcher {
    async fn dispatch(&self, event: &ChangeEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                // A ChangeEvent that doesn't serialize would be a bug, not
                // an operational condition; log loudly and bail on this one.
                error!(error = %e, event_id = %event.id, "change event failed to serialize");
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let mut con = self.con.clone();
        let publish: Result<(), redis::RedisError> = con.publish(&self.channel, &json).await;

        match publish {
            Ok(()) => {
                self.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
                info!(
                    event_id = %event.id,
                    case = %event.case_title,
                    kind = %event.kind,
                    "change event published — the web app has been notified"
                );
                self.record(event, DeliveryOutcome::Sent, None).await;
            }
            Err(e) => {
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    event_id = %event.id,
                    "change event publish failed — event is persisted, delivery will lag"
                );
                self.record(event, DeliveryOutcome::Failed, Some(e.to_string()))
                    .await;
            }
        }
    }
}

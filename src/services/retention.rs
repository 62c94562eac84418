use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::audit::AuditContext;
use crate::services::{AuditLogger, ExportProcessor};

/// Runs the audit retention cleanup and the expired export sweep on
/// `interval` until the runtime shuts down. The first run happens immediately.
pub fn spawn_retention_task(
    audit: AuditLogger,
    exports: ExportProcessor,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let context = AuditContext {
            request_id: Some("retention-task".to_string()),
            ..AuditContext::default()
        };

        loop {
            ticker.tick().await;
            if let Err(err) = audit.cleanup(&context).await {
                tracing::error!("Audit retention cleanup failed: {:?}", err);
            }
            if let Err(err) = exports.sweep_expired().await {
                tracing::error!("Expired export sweep failed: {:?}", err);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{AuditAction, NewAuditEntry};
    use crate::repository::in_memory::InMemoryStore;
    use crate::repository::Repositories;
    use crate::services::ExportStore;
    use crate::test_support::{recording_notifier, MutableClock};
    use std::sync::Arc;

    fn exports(
        store: &Arc<InMemoryStore>,
        clock: &Arc<MutableClock>,
        audit: &AuditLogger,
    ) -> ExportProcessor {
        let (notifier, _) = recording_notifier();

        ExportProcessor::new(
            Repositories::in_memory(store.clone()),
            ExportStore::new(std::env::temp_dir()),
            audit.clone(),
            notifier,
            clock.clone(),
            chrono::Duration::hours(72),
        )
    }

    #[tokio::test]
    async fn first_sweep_runs_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(MutableClock::starting_now());
        let audit = AuditLogger::new(store.clone(), store.clone(), clock.clone(), 30);
        audit
            .record(
                NewAuditEntry::new(AuditAction::ConsentRecorded, "stale"),
                &AuditContext::default(),
            )
            .await;
        clock.advance(chrono::Duration::days(31));

        let exports = exports(&store, &clock, &audit);
        let handle = spawn_retention_task(audit, exports, Duration::from_secs(3600));
        for _ in 0..50 {
            if store
                .audit_entries()
                .iter()
                .any(|entry| entry.action == AuditAction::AuditRetentionCleanup)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        let entries = store.audit_entries();
        assert!(entries.iter().all(|entry| entry.description != "stale"));
        assert!(entries
            .iter()
            .any(|entry| entry.action == AuditAction::AuditRetentionCleanup));
    }
}

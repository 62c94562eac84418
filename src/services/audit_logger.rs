use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::audit::{
    AuditAction, AuditContext, AuditEntry, AuditPage, AuditQuery, AuditStats, NewAuditEntry,
};
use crate::domain::consent::LegalBasis;
use crate::domain::subscriber_email::EmailHash;
use crate::repository::{AuditRepository, RepositoryResult, SubscriberRepository};
use crate::services::SharedClock;

pub const DEFAULT_RETENTION_DAYS: i64 = 2555;
const MAX_PAGE_SIZE: i64 = 100;

/// What happened to an audit write. Callers may ignore it; a dropped entry
/// has already been reported on the operational log.
#[derive(Debug)]
pub enum AuditOutcome {
    Recorded(AuditEntry),
    Dropped(String),
}

impl AuditOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditOutcome::Recorded(_))
    }
}

/// Filters accepted by the audit search. `page` starts at 1.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSearch {
    pub email: Option<String>,
    pub ip: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "startDate")]
    pub start: Option<DateTime<Utc>>,
    #[serde(alias = "endDate")]
    pub end: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct AuditLogger {
    audit: Arc<dyn AuditRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
    clock: SharedClock,
    retention: Duration,
}

impl AuditLogger {
    pub fn new(
        audit: Arc<dyn AuditRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
        clock: SharedClock,
        retention_days: i64,
    ) -> Self {
        AuditLogger {
            audit,
            subscribers,
            clock,
            retention: Duration::days(retention_days),
        }
    }

    /// Writes one entry. Never fails the caller.
    pub async fn record(&self, entry: NewAuditEntry, context: &AuditContext) -> AuditOutcome {
        let action = entry.action;
        let entry = entry.into_entry(context, self.clock.utc());

        match self.audit.insert(&entry).await {
            Ok(()) => AuditOutcome::Recorded(entry),
            Err(err) => {
                tracing::error!(
                    action = %action.as_ref(),
                    request_id = ?context.request_id,
                    "Failed to write audit entry: {:?}",
                    err
                );
                AuditOutcome::Dropped(err.to_string())
            }
        }
    }

    #[tracing::instrument(name = "Search audit entries", skip(self, search))]
    pub async fn search(&self, search: &AuditSearch) -> Result<AuditPage, AuditSearchError> {
        let limit = search.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
        let page = search.page.unwrap_or(1).max(1);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or(AuditSearchError::PageOutOfRange)?;

        let subscriber_id = match search.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => {
                match self
                    .subscribers
                    .find_by_email_hash(&EmailHash::of(email))
                    .await?
                {
                    Some(subscriber) => Some(subscriber.id),
                    None => return Ok(AuditPage::empty()),
                }
            }
            _ => None,
        };
        let action = search
            .action
            .clone()
            .map(AuditAction::parse)
            .transpose()
            .map_err(AuditSearchError::UnknownAction)?;

        let query = AuditQuery {
            subscriber_id,
            ip: search.ip.clone(),
            action,
            description: search.description.clone(),
            start: search.start,
            end: search.end,
            limit,
            offset,
        };
        let (entries, total) = self.audit.search(&query).await?;

        Ok(AuditPage {
            entries,
            total,
            has_more: offset + limit < total,
        })
    }

    pub async fn for_subscriber(&self, subscriber_id: Uuid) -> RepositoryResult<Vec<AuditEntry>> {
        self.audit.find_by_subscriber(subscriber_id).await
    }

    pub async fn recent(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>> {
        self.audit.recent(limit).await
    }

    pub async fn stats(&self, window: Duration) -> RepositoryResult<AuditStats> {
        let end = self.clock.utc();

        self.audit.stats(end - window, end).await
    }

    /// Deletes entries older than the retention window and records the sweep.
    #[tracing::instrument(name = "Audit retention cleanup", skip(self, context))]
    pub async fn cleanup(&self, context: &AuditContext) -> RepositoryResult<u64> {
        let cutoff = self.clock.utc() - self.retention;
        let deleted = self.audit.delete_older_than(cutoff).await?;

        tracing::info!(deleted, %cutoff, "Audit retention cleanup finished");
        self.record(
            NewAuditEntry::new(
                AuditAction::AuditRetentionCleanup,
                format!("Deleted {} audit entries older than {}", deleted, cutoff),
            )
            .legal_basis(LegalBasis::LegalObligation)
            .new_data(serde_json::json!({
                "deletedCount": deleted,
                "cutoff": cutoff,
                "retentionDays": self.retention.num_days(),
            })),
            context,
        )
        .await;

        Ok(deleted)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditSearchError {
    #[error("{0}")]
    UnknownAction(String),
    #[error("Page is out of range")]
    PageOutOfRange,
    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),
}

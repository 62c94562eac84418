//! Storage ports.
//!
//! Services only see these traits. [`postgres::PostgresStore`] backs them in
//! production and [`in_memory::InMemoryStore`] backs them in tests; both
//! implement every trait so [`Repositories`] can hand out one store behind
//! several handles.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::admin::AdminUser;
use crate::domain::audit::{AuditEntry, AuditQuery, AuditStats};
use crate::domain::consent::ConsentRecord;
use crate::domain::data_request::{DataRequest, RequestUpdate};
use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber::{Subscriber, SubscriberFilter, SubscriberStats};
use crate::domain::subscriber_email::EmailHash;
use crate::domain::token::{Token, TokenPurpose};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository connection failed: {0}")]
    Connection(String),
    #[error("repository query failed: {0}")]
    Query(String),
    /// A unique constraint rejected the write.
    #[error("a row with the same unique key already exists")]
    Conflict,
    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Consent fields refreshed when an inactive subscriber signs up again.
#[derive(Debug, Clone)]
pub struct Reactivation {
    pub consent_version: String,
    pub consent_ip: Option<String>,
    pub consent_user_agent: Option<String>,
    pub source: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the email hash is taken.
    async fn insert(&self, subscriber: &Subscriber) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Subscriber>>;

    async fn find_by_email_hash(&self, hash: &EmailHash) -> RepositoryResult<Option<Subscriber>>;

    /// Flips an inactive subscriber back to active. Returns `false` if it was already active.
    async fn reactivate(&self, id: Uuid, reactivation: &Reactivation) -> RepositoryResult<bool>;

    /// Returns `false` if the subscriber was already verified.
    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Unsubscribes an active subscriber. Returns `false` if it was already inactive.
    async fn unsubscribe(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Stops processing without recording an unsubscription.
    async fn restrict(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool>;

    async fn list(
        &self,
        filter: SubscriberFilter,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<Subscriber>, i64)>;

    async fn stats(&self, recent_since: DateTime<Utc>) -> RepositoryResult<SubscriberStats>;
}

#[async_trait]
pub trait ConsentRepository: Send + Sync {
    async fn insert(&self, record: &ConsentRecord) -> RepositoryResult<()>;

    /// Newest first, email compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Vec<ConsentRecord>>;
}

#[async_trait]
pub trait DataRequestRepository: Send + Sync {
    async fn insert(&self, request: &DataRequest) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<DataRequest>>;

    async fn find_by_export_id(&self, export_id: Uuid) -> RepositoryResult<Option<DataRequest>>;

    /// Compare-and-set on the status column. Returns `false` when the row was
    /// not in `from` anymore, which means another caller won the transition.
    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        update: RequestUpdate,
    ) -> RepositoryResult<bool>;

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DataRequest>>;

    /// Export ids whose download window closed at or before `now`.
    async fn expired_exports(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>>;

    async fn count_open(&self) -> RepositoryResult<i64>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> RepositoryResult<()>;

    async fn find(&self, token: &str, purpose: TokenPurpose) -> RepositoryResult<Option<Token>>;

    /// Most recently issued unconsumed token of `purpose` owned by `owner_id`.
    async fn find_active_for_owner(
        &self,
        owner_id: Uuid,
        purpose: TokenPurpose,
    ) -> RepositoryResult<Option<Token>>;

    /// Marks the token used. Returns `false` if somebody consumed it first.
    async fn consume(&self, token: &str, at: DateTime<Utc>) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert(&self, entry: &AuditEntry) -> RepositoryResult<()>;

    /// Newest first. Returns the requested page and the total match count.
    async fn search(&self, query: &AuditQuery) -> RepositoryResult<(Vec<AuditEntry>, i64)>;

    async fn find_by_subscriber(&self, subscriber_id: Uuid) -> RepositoryResult<Vec<AuditEntry>>;

    /// Single delete-by-cutoff. Entries written concurrently are newer than
    /// the cutoff and survive.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;

    async fn stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepositoryResult<AuditStats>;

    async fn recent(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>>;
}

/// Rows removed by an erasure, reported as counts only.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCounts {
    pub subscribers: u64,
    pub audit_logs: u64,
    pub data_requests: u64,
    pub consent_records: u64,
    pub tokens: u64,
    pub export_files: u64,
}

/// Result of an erasure transaction: the counts plus the export artifacts
/// that belonged to the deleted requests and still sit on disk.
#[derive(Debug, Clone, Default)]
pub struct ErasedSubject {
    pub counts: ErasureCounts,
    pub export_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ErasureTarget {
    /// The DELETE request being executed. It is detached and redacted, not deleted.
    pub request_id: Uuid,
    pub subscriber_id: Option<Uuid>,
    pub email: String,
    /// Matches requests filed before the subject had a subscriber row.
    pub email_hash: EmailHash,
}

#[async_trait]
pub trait ErasureRepository: Send + Sync {
    /// Removes everything held about the subject in one transaction.
    async fn erase_subject(&self, target: &ErasureTarget) -> RepositoryResult<ErasedSubject>;
}

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn insert(&self, admin: &AdminUser) -> RepositoryResult<()>;

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<AdminUser>>;

    async fn record_failed_login(
        &self,
        id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()>;

    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> RepositoryResult<()>;
}

/// Handles to every repository, shared by the services.
#[derive(Clone)]
pub struct Repositories {
    pub subscribers: Arc<dyn SubscriberRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub data_requests: Arc<dyn DataRequestRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub erasure: Arc<dyn ErasureRepository>,
    pub admins: Arc<dyn AdminRepository>,
}

impl Repositories {
    pub fn postgres(db_pool: PgPool) -> Repositories {
        Repositories::from_store(Arc::new(postgres::PostgresStore::new(db_pool)))
    }

    pub fn in_memory(store: Arc<in_memory::InMemoryStore>) -> Repositories {
        Repositories::from_store(store)
    }

    fn from_store<S>(store: Arc<S>) -> Repositories
    where
        S: SubscriberRepository
            + ConsentRepository
            + DataRequestRepository
            + TokenRepository
            + AuditRepository
            + ErasureRepository
            + AdminRepository
            + 'static,
    {
        Repositories {
            subscribers: store.clone(),
            consents: store.clone(),
            data_requests: store.clone(),
            tokens: store.clone(),
            audit: store.clone(),
            erasure: store.clone(),
            admins: store,
        }
    }
}

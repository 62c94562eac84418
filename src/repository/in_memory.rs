//! In-process adapter holding every table behind one mutex.
//!
//! A single lock makes each call atomic, which is what the Postgres adapter
//! gets from row locks and transactions. Fault switches let tests make the
//! audit sink or the erasure transaction fail on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::admin::AdminUser;
use crate::domain::audit::{AuditEntry, AuditQuery, AuditStats};
use crate::domain::consent::ConsentRecord;
use crate::domain::data_request::{DataRequest, RequestUpdate};
use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber::{Subscriber, SubscriberFilter, SubscriberStats};
use crate::domain::subscriber_email::EmailHash;
use crate::domain::token::{Token, TokenPurpose};
use crate::repository::{
    AdminRepository, AuditRepository, ConsentRepository, DataRequestRepository, ErasedSubject,
    ErasureCounts, ErasureRepository, ErasureTarget, Reactivation, RepositoryError,
    RepositoryResult, SubscriberRepository, TokenRepository,
};

#[derive(Default)]
struct Tables {
    subscribers: HashMap<Uuid, Subscriber>,
    consents: Vec<ConsentRecord>,
    data_requests: HashMap<Uuid, DataRequest>,
    tokens: HashMap<String, Token>,
    audit: Vec<AuditEntry>,
    admins: HashMap<Uuid, AdminUser>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_audit_writes: AtomicBool,
    fail_erasure: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_erasure(&self, fail: bool) {
        self.fail_erasure.store(fail, Ordering::SeqCst);
    }

    /// Every stored audit entry, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().map(|tables| tables.audit.clone()).unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().map(|tables| tables.subscribers.len()).unwrap_or_default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Connection("in-memory store lock poisoned".into()))
    }
}

fn newest_first<T, F>(rows: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
}

fn page<T: Clone>(rows: &[T], limit: i64, offset: i64) -> Vec<T> {
    rows.iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl SubscriberRepository for InMemoryStore {
    async fn insert(&self, subscriber: &Subscriber) -> RepositoryResult<()> {
        let mut tables = self.lock()?;

        if tables
            .subscribers
            .values()
            .any(|existing| existing.email_hash == subscriber.email_hash)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.subscribers.insert(subscriber.id, subscriber.clone());

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Subscriber>> {
        Ok(self.lock()?.subscribers.get(&id).cloned())
    }

    async fn find_by_email_hash(&self, hash: &EmailHash) -> RepositoryResult<Option<Subscriber>> {
        Ok(self
            .lock()?
            .subscribers
            .values()
            .find(|subscriber| &subscriber.email_hash == hash)
            .cloned())
    }

    async fn reactivate(&self, id: Uuid, reactivation: &Reactivation) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.subscribers.get_mut(&id) {
            Some(subscriber) if !subscriber.is_active => {
                subscriber.is_active = true;
                subscriber.consent_given = true;
                subscriber.consent_version = reactivation.consent_version.clone();
                subscriber.consent_timestamp = reactivation.at;
                subscriber.consent_ip = reactivation.consent_ip.clone();
                subscriber.consent_user_agent = reactivation.consent_user_agent.clone();
                subscriber.source = reactivation.source.clone();
                subscriber.utm_source = reactivation.utm_source.clone();
                subscriber.utm_medium = reactivation.utm_medium.clone();
                subscriber.utm_campaign = reactivation.utm_campaign.clone();
                subscriber.unsubscribed_at = None;
                subscriber.updated_at = reactivation.at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.subscribers.get_mut(&id) {
            Some(subscriber) if !subscriber.is_verified => {
                subscriber.is_verified = true;
                subscriber.verified_at = Some(at);
                subscriber.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unsubscribe(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.subscribers.get_mut(&id) {
            Some(subscriber) if subscriber.is_active => {
                subscriber.is_active = false;
                subscriber.unsubscribed_at = Some(at);
                subscriber.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restrict(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.subscribers.get_mut(&id) {
            Some(subscriber) if subscriber.is_active => {
                subscriber.is_active = false;
                subscriber.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(
        &self,
        filter: SubscriberFilter,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<Subscriber>, i64)> {
        let tables = self.lock()?;
        let needle = search.map(str::to_lowercase);
        let mut rows: Vec<Subscriber> = tables
            .subscribers
            .values()
            .filter(|subscriber| filter.matches(subscriber))
            .filter(|subscriber| match &needle {
                Some(needle) => subscriber.email.normalized().contains(needle.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        newest_first(&mut rows, |subscriber| subscriber.created_at);

        Ok((page(&rows, limit, offset), rows.len() as i64))
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> RepositoryResult<SubscriberStats> {
        let tables = self.lock()?;
        let subscribers = tables.subscribers.values();
        let mut stats = SubscriberStats::default();

        for subscriber in subscribers {
            stats.total += 1;
            stats.active += subscriber.is_active as i64;
            stats.verified += subscriber.is_verified as i64;
            stats.unverified += (subscriber.is_active && !subscriber.is_verified) as i64;
            stats.recent_signups += (subscriber.created_at >= recent_since) as i64;
        }

        Ok(stats)
    }
}

#[async_trait]
impl ConsentRepository for InMemoryStore {
    async fn insert(&self, record: &ConsentRecord) -> RepositoryResult<()> {
        self.lock()?.consents.push(record.clone());

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Vec<ConsentRecord>> {
        let email = email.to_lowercase();
        let mut rows: Vec<ConsentRecord> = self
            .lock()?
            .consents
            .iter()
            .filter(|record| record.email.to_lowercase() == email)
            .cloned()
            .collect();
        newest_first(&mut rows, |record| record.timestamp);

        Ok(rows)
    }
}

#[async_trait]
impl DataRequestRepository for InMemoryStore {
    async fn insert(&self, request: &DataRequest) -> RepositoryResult<()> {
        self.lock()?.data_requests.insert(request.id, request.clone());

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<DataRequest>> {
        Ok(self.lock()?.data_requests.get(&id).cloned())
    }

    async fn find_by_export_id(&self, export_id: Uuid) -> RepositoryResult<Option<DataRequest>> {
        Ok(self
            .lock()?
            .data_requests
            .values()
            .find(|request| request.export_id == Some(export_id))
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        update: RequestUpdate,
    ) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.data_requests.get_mut(&id) {
            Some(request) if request.status == from => {
                request.status = to;
                update.apply(request);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DataRequest>> {
        let mut rows: Vec<DataRequest> = self.lock()?.data_requests.values().cloned().collect();
        newest_first(&mut rows, |request| request.created_at);

        Ok(page(&rows, limit, 0))
    }

    async fn expired_exports(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>> {
        Ok(self
            .lock()?
            .data_requests
            .values()
            .filter(|request| matches!(request.export_expires_at, Some(at) if at <= now))
            .filter_map(|request| request.export_id)
            .collect())
    }

    async fn count_open(&self) -> RepositoryResult<i64> {
        Ok(self
            .lock()?
            .data_requests
            .values()
            .filter(|request| !request.status.is_terminal())
            .count() as i64)
    }
}

#[async_trait]
impl TokenRepository for InMemoryStore {
    async fn insert(&self, token: &Token) -> RepositoryResult<()> {
        let mut tables = self.lock()?;

        if tables.tokens.contains_key(&token.token) {
            return Err(RepositoryError::Conflict);
        }
        tables.tokens.insert(token.token.clone(), token.clone());

        Ok(())
    }

    async fn find(&self, token: &str, purpose: TokenPurpose) -> RepositoryResult<Option<Token>> {
        Ok(self
            .lock()?
            .tokens
            .get(token)
            .filter(|stored| stored.purpose == purpose)
            .cloned())
    }

    async fn find_active_for_owner(
        &self,
        owner_id: Uuid,
        purpose: TokenPurpose,
    ) -> RepositoryResult<Option<Token>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|token| {
                token.owner_id == owner_id && token.purpose == purpose && !token.is_consumed()
            })
            .max_by_key(|token| token.issued_at)
            .cloned())
    }

    async fn consume(&self, token: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut tables = self.lock()?;

        match tables.tokens.get_mut(token) {
            Some(stored) if !stored.is_consumed() => {
                stored.consumed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn insert(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection("audit sink unavailable".into()));
        }
        let mut tables = self.lock()?;

        if let Some(subscriber_id) = entry.subscriber_id {
            if !tables.subscribers.contains_key(&subscriber_id) {
                return Err(RepositoryError::Query(format!(
                    "subscriber {} does not exist",
                    subscriber_id
                )));
            }
        }
        tables.audit.push(entry.clone());

        Ok(())
    }

    async fn search(&self, query: &AuditQuery) -> RepositoryResult<(Vec<AuditEntry>, i64)> {
        let mut rows: Vec<AuditEntry> = self
            .lock()?
            .audit
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        newest_first(&mut rows, |entry| entry.created_at);

        Ok((page(&rows, query.limit, query.offset), rows.len() as i64))
    }

    async fn find_by_subscriber(&self, subscriber_id: Uuid) -> RepositoryResult<Vec<AuditEntry>> {
        let mut rows: Vec<AuditEntry> = self
            .lock()?
            .audit
            .iter()
            .filter(|entry| entry.subscriber_id == Some(subscriber_id))
            .cloned()
            .collect();
        newest_first(&mut rows, |entry| entry.created_at);

        Ok(rows)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut tables = self.lock()?;
        let before = tables.audit.len();
        tables.audit.retain(|entry| entry.created_at >= cutoff);

        Ok((before - tables.audit.len()) as u64)
    }

    async fn stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepositoryResult<AuditStats> {
        let tables = self.lock()?;
        let mut by_action: HashMap<String, i64> = HashMap::new();
        let mut by_basis: HashMap<String, i64> = HashMap::new();
        let mut total_count = 0;

        for entry in tables
            .audit
            .iter()
            .filter(|entry| entry.created_at >= start && entry.created_at <= end)
        {
            total_count += 1;
            *by_action.entry(entry.action.as_ref().to_string()).or_default() += 1;
            if let Some(basis) = entry.legal_basis {
                *by_basis.entry(basis.as_ref().to_string()).or_default() += 1;
            }
        }

        let mut action_counts: Vec<(String, i64)> = by_action.into_iter().collect();
        let mut legal_basis_counts: Vec<(String, i64)> = by_basis.into_iter().collect();
        action_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        legal_basis_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(AuditStats {
            total_count,
            action_counts,
            legal_basis_counts,
        })
    }

    async fn recent(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>> {
        let mut rows = self.lock()?.audit.clone();
        newest_first(&mut rows, |entry| entry.created_at);

        Ok(page(&rows, limit, 0))
    }
}

#[async_trait]
impl ErasureRepository for InMemoryStore {
    async fn erase_subject(&self, target: &ErasureTarget) -> RepositoryResult<ErasedSubject> {
        if self.fail_erasure.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("erasure transaction aborted".into()));
        }
        let mut tables = self.lock()?;
        let mut counts = ErasureCounts::default();

        if let Some(subscriber_id) = target.subscriber_id {
            let before = tables.audit.len();
            tables
                .audit
                .retain(|entry| entry.subscriber_id != Some(subscriber_id));
            counts.audit_logs = (before - tables.audit.len()) as u64;
        }

        let doomed: Vec<DataRequest> = tables
            .data_requests
            .values()
            .filter(|request| request.id != target.request_id)
            .filter(|request| {
                request.email_hash == target.email_hash
                    || (target.subscriber_id.is_some()
                        && request.subscriber_id == target.subscriber_id)
            })
            .cloned()
            .collect();
        for request in &doomed {
            tables.data_requests.remove(&request.id);
        }
        counts.data_requests = doomed.len() as u64;

        let before = tables.tokens.len();
        tables.tokens.retain(|_, token| {
            Some(token.owner_id) != target.subscriber_id
                && !doomed.iter().any(|request| request.id == token.owner_id)
        });
        counts.tokens = (before - tables.tokens.len()) as u64;

        if let Some(subscriber_id) = target.subscriber_id {
            if tables.subscribers.remove(&subscriber_id).is_some() {
                counts.subscribers = 1;
            }
        }

        if let Some(request) = tables.data_requests.get_mut(&target.request_id) {
            request.subscriber_id = None;
            request.request_email = None;
        }

        let email = target.email.to_lowercase();
        let before = tables.consents.len();
        tables
            .consents
            .retain(|record| record.email.to_lowercase() != email);
        counts.consent_records = (before - tables.consents.len()) as u64;

        Ok(ErasedSubject {
            counts,
            export_ids: doomed.iter().filter_map(|request| request.export_id).collect(),
        })
    }
}

#[async_trait]
impl AdminRepository for InMemoryStore {
    async fn insert(&self, admin: &AdminUser) -> RepositoryResult<()> {
        let mut tables = self.lock()?;

        if tables
            .admins
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&admin.email))
        {
            return Err(RepositoryError::Conflict);
        }
        tables.admins.insert(admin.id, admin.clone());

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>> {
        Ok(self
            .lock()?
            .admins
            .values()
            .find(|admin| admin.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<AdminUser>> {
        Ok(self.lock()?.admins.get(&id).cloned())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        if let Some(admin) = self.lock()?.admins.get_mut(&id) {
            admin.failed_login_attempts = failed_attempts;
            admin.locked_until = locked_until;
        }

        Ok(())
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> RepositoryResult<()> {
        if let Some(admin) = self.lock()?.admins.get_mut(&id) {
            admin.failed_login_attempts = 0;
            admin.locked_until = None;
            admin.last_login_at = Some(at);
            admin.last_login_ip = ip;
        }

        Ok(())
    }
}

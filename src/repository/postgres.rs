use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::admin::{AdminRole, AdminUser};
use crate::domain::audit::{AuditAction, AuditEntry, AuditQuery, AuditStats};
use crate::domain::consent::{ConsentRecord, ConsentType, LegalBasis};
use crate::domain::data_request::{DataRequest, RequestType, RequestUpdate};
use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber::{Subscriber, SubscriberFilter, SubscriberStats};
use crate::domain::subscriber_email::{EmailHash, SubscriberEmail};
use crate::domain::token::{Token, TokenPurpose};
use crate::repository::{
    AdminRepository, AuditRepository, ConsentRepository, DataRequestRepository, ErasedSubject,
    ErasureCounts, ErasureRepository, ErasureTarget, Reactivation, RepositoryError,
    RepositoryResult, SubscriberRepository, TokenRepository,
};

const UNIQUE_VIOLATION: &str = "23505";

const SUBSCRIBER_COLUMNS: &str = r#"
    id, email, email_hash, consent_given, consent_version, consent_timestamp,
    consent_ip, consent_user_agent, is_verified, is_active, source,
    utm_source, utm_medium, utm_campaign, created_at, updated_at,
    verified_at, unsubscribed_at
"#;

const DATA_REQUEST_COLUMNS: &str = r#"
    id, subscriber_id, request_email, email_hash, request_type, status,
    verification_sent_at, verified_at, processed_at, export_id, export_url,
    export_expires_at, notes, created_at
"#;

const AUDIT_COLUMNS: &str = r#"
    id, subscriber_id, action, description, ip_address, user_agent,
    request_id, legal_basis, old_data, new_data, created_at
"#;

pub struct PostgresStore {
    db_pool: PgPool,
}

impl PostgresStore {
    pub fn new(db_pool: PgPool) -> PostgresStore {
        PostgresStore { db_pool }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepositoryError::Conflict
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::Connection(err.to_string())
            }
            _ => RepositoryError::Query(err.to_string()),
        }
    }
}

fn corrupt(err: String) -> RepositoryError {
    RepositoryError::Corrupt(err)
}

fn subscriber_from_row(row: &PgRow) -> RepositoryResult<Subscriber> {
    Ok(Subscriber {
        id: row.try_get("id")?,
        email: SubscriberEmail::parse(row.try_get("email")?).map_err(corrupt)?,
        email_hash: EmailHash::from_stored(row.try_get("email_hash")?),
        consent_given: row.try_get("consent_given")?,
        consent_version: row.try_get("consent_version")?,
        consent_timestamp: row.try_get("consent_timestamp")?,
        consent_ip: row.try_get("consent_ip")?,
        consent_user_agent: row.try_get("consent_user_agent")?,
        is_verified: row.try_get("is_verified")?,
        is_active: row.try_get("is_active")?,
        source: row.try_get("source")?,
        utm_source: row.try_get("utm_source")?,
        utm_medium: row.try_get("utm_medium")?,
        utm_campaign: row.try_get("utm_campaign")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        verified_at: row.try_get("verified_at")?,
        unsubscribed_at: row.try_get("unsubscribed_at")?,
    })
}

fn consent_from_row(row: &PgRow) -> RepositoryResult<ConsentRecord> {
    Ok(ConsentRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        consent_type: ConsentType::parse(row.try_get("consent_type")?).map_err(corrupt)?,
        consent_given: row.try_get("consent_given")?,
        consent_version: row.try_get("consent_version")?,
        legal_basis: LegalBasis::parse(row.try_get("legal_basis")?).map_err(corrupt)?,
        purpose: row.try_get("purpose")?,
        ip: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        source: row.try_get("source")?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn data_request_from_row(row: &PgRow) -> RepositoryResult<DataRequest> {
    Ok(DataRequest {
        id: row.try_get("id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        request_email: row.try_get("request_email")?,
        email_hash: EmailHash::from_stored(row.try_get("email_hash")?),
        request_type: RequestType::parse(row.try_get("request_type")?).map_err(corrupt)?,
        status: RequestStatus::parse(row.try_get("status")?).map_err(corrupt)?,
        verification_sent_at: row.try_get("verification_sent_at")?,
        verified_at: row.try_get("verified_at")?,
        processed_at: row.try_get("processed_at")?,
        export_id: row.try_get("export_id")?,
        export_url: row.try_get("export_url")?,
        export_expires_at: row.try_get("export_expires_at")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn token_from_row(row: &PgRow) -> RepositoryResult<Token> {
    Ok(Token {
        token: row.try_get("token")?,
        purpose: TokenPurpose::parse(row.try_get("purpose")?).map_err(corrupt)?,
        owner_id: row.try_get("owner_id")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        consumed_at: row.try_get("consumed_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> RepositoryResult<AuditEntry> {
    let legal_basis: Option<String> = row.try_get("legal_basis")?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        action: AuditAction::parse(row.try_get("action")?).map_err(corrupt)?,
        description: row.try_get("description")?,
        ip: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        request_id: row.try_get("request_id")?,
        legal_basis: legal_basis
            .map(LegalBasis::parse)
            .transpose()
            .map_err(corrupt)?,
        old_data: row.try_get("old_data")?,
        new_data: row.try_get("new_data")?,
        created_at: row.try_get("created_at")?,
    })
}

fn admin_from_row(row: &PgRow) -> RepositoryResult<AdminUser> {
    Ok(AdminUser {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: AdminRole::parse(row.try_get("role")?).map_err(corrupt)?,
        is_active: row.try_get("is_active")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        locked_until: row.try_get("locked_until")?,
        last_login_at: row.try_get("last_login_at")?,
        last_login_ip: row.try_get("last_login_ip")?,
        created_at: row.try_get("created_at")?,
    })
}

fn filter_clause(filter: SubscriberFilter) -> &'static str {
    match filter {
        SubscriberFilter::All => "TRUE",
        SubscriberFilter::Active => "is_active",
        SubscriberFilter::Inactive => "NOT is_active",
        SubscriberFilter::Verified => "is_verified",
        SubscriberFilter::Unverified => "NOT is_verified",
    }
}

#[async_trait]
impl SubscriberRepository for PostgresStore {
    #[tracing::instrument(name = "Insert a new subscriber", skip(self, subscriber))]
    async fn insert(&self, subscriber: &Subscriber) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                id, email, email_hash, consent_given, consent_version, consent_timestamp,
                consent_ip, consent_user_agent, is_verified, is_active, source,
                utm_source, utm_medium, utm_campaign, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(subscriber.id)
        .bind(subscriber.email.as_ref())
        .bind(subscriber.email_hash.as_ref())
        .bind(subscriber.consent_given)
        .bind(&subscriber.consent_version)
        .bind(subscriber.consent_timestamp)
        .bind(&subscriber.consent_ip)
        .bind(&subscriber.consent_user_agent)
        .bind(subscriber.is_verified)
        .bind(subscriber.is_active)
        .bind(&subscriber.source)
        .bind(&subscriber.utm_source)
        .bind(&subscriber.utm_medium)
        .bind(&subscriber.utm_campaign)
        .bind(subscriber.created_at)
        .bind(subscriber.updated_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Subscriber>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscribers WHERE id = $1",
            SUBSCRIBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(subscriber_from_row).transpose()
    }

    async fn find_by_email_hash(&self, hash: &EmailHash) -> RepositoryResult<Option<Subscriber>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscribers WHERE email_hash = $1",
            SUBSCRIBER_COLUMNS
        ))
        .bind(hash.as_ref())
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(subscriber_from_row).transpose()
    }

    async fn reactivate(&self, id: Uuid, reactivation: &Reactivation) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET is_active = TRUE, consent_given = TRUE, consent_version = $2,
                consent_timestamp = $3, consent_ip = $4, consent_user_agent = $5,
                source = $6, utm_source = $7, utm_medium = $8, utm_campaign = $9,
                unsubscribed_at = NULL, updated_at = $3
            WHERE id = $1 AND is_active = FALSE
            "#,
        )
        .bind(id)
        .bind(&reactivation.consent_version)
        .bind(reactivation.at)
        .bind(&reactivation.consent_ip)
        .bind(&reactivation.consent_user_agent)
        .bind(&reactivation.source)
        .bind(&reactivation.utm_source)
        .bind(&reactivation.utm_medium)
        .bind(&reactivation.utm_campaign)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET is_verified = TRUE, verified_at = $2, updated_at = $2
            WHERE id = $1 AND is_verified = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unsubscribe(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET is_active = FALSE, unsubscribed_at = $2, updated_at = $2
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn restrict(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE subscribers SET is_active = FALSE, updated_at = $2 WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .bind(at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(
        &self,
        filter: SubscriberFilter,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<Subscriber>, i64)> {
        let pattern = search.map(|search| format!("%{}%", search.to_lowercase()));
        let where_clause = format!(
            "{} AND ($1::TEXT IS NULL OR LOWER(email) LIKE $1)",
            filter_clause(filter)
        );

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM subscribers WHERE {}",
            where_clause
        ))
        .bind(&pattern)
        .fetch_one(&self.db_pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscribers WHERE {} ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            SUBSCRIBER_COLUMNS, where_clause
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let subscribers = rows
            .iter()
            .map(subscriber_from_row)
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok((subscribers, total))
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> RepositoryResult<SubscriberStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_active) AS active,
                COUNT(*) FILTER (WHERE is_verified) AS verified,
                COUNT(*) FILTER (WHERE is_active AND NOT is_verified) AS unverified,
                COUNT(*) FILTER (WHERE created_at >= $1) AS recent_signups
            FROM subscribers
            "#,
        )
        .bind(recent_since)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(SubscriberStats {
            total: row.try_get("total")?,
            active: row.try_get("active")?,
            verified: row.try_get("verified")?,
            unverified: row.try_get("unverified")?,
            recent_signups: row.try_get("recent_signups")?,
        })
    }
}

#[async_trait]
impl ConsentRepository for PostgresStore {
    #[tracing::instrument(name = "Insert a consent record", skip(self, record))]
    async fn insert(&self, record: &ConsentRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consent_records (
                id, email, consent_type, consent_given, consent_version, legal_basis,
                purpose, ip_address, user_agent, source, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.email)
        .bind(record.consent_type.as_ref())
        .bind(record.consent_given)
        .bind(&record.consent_version)
        .bind(record.legal_basis.as_ref())
        .bind(&record.purpose)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .bind(&record.source)
        .bind(record.timestamp)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Vec<ConsentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, consent_type, consent_given, consent_version, legal_basis,
                   purpose, ip_address, user_agent, source, timestamp
            FROM consent_records
            WHERE LOWER(email) = LOWER($1)
            ORDER BY timestamp DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(consent_from_row).collect()
    }
}

#[async_trait]
impl DataRequestRepository for PostgresStore {
    #[tracing::instrument(name = "Insert a data request", skip(self, request))]
    async fn insert(&self, request: &DataRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO data_requests (
                id, subscriber_id, request_email, email_hash, request_type, status,
                verification_sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id)
        .bind(request.subscriber_id)
        .bind(&request.request_email)
        .bind(request.email_hash.as_ref())
        .bind(request.request_type.as_ref())
        .bind(request.status.as_ref())
        .bind(request.verification_sent_at)
        .bind(request.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<DataRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM data_requests WHERE id = $1",
            DATA_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(data_request_from_row).transpose()
    }

    async fn find_by_export_id(&self, export_id: Uuid) -> RepositoryResult<Option<DataRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM data_requests WHERE export_id = $1",
            DATA_REQUEST_COLUMNS
        ))
        .bind(export_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(data_request_from_row).transpose()
    }

    #[tracing::instrument(name = "Transition a data request", skip(self, update))]
    async fn transition(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        update: RequestUpdate,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE data_requests
            SET status = $3,
                verified_at = COALESCE($4, verified_at),
                processed_at = COALESCE($5, processed_at),
                export_id = COALESCE($6, export_id),
                export_url = COALESCE($7, export_url),
                export_expires_at = COALESCE($8, export_expires_at),
                notes = COALESCE($9, notes)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_ref())
        .bind(to.as_ref())
        .bind(update.verified_at)
        .bind(update.processed_at)
        .bind(update.export_id)
        .bind(update.export_url)
        .bind(update.export_expires_at)
        .bind(update.notes)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DataRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM data_requests ORDER BY created_at DESC LIMIT $1",
            DATA_REQUEST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(data_request_from_row).collect()
    }

    async fn expired_exports(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT export_id FROM data_requests
            WHERE export_id IS NOT NULL AND export_expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.try_get("export_id"))
            .collect::<Result<Vec<Uuid>, _>>()?)
    }

    async fn count_open(&self) -> RepositoryResult<i64> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM data_requests WHERE status IN ('PENDING', 'VERIFIED')",
        )
        .fetch_one(&self.db_pool)
        .await?
        .try_get("total")?;

        Ok(total)
    }
}

#[async_trait]
impl TokenRepository for PostgresStore {
    #[tracing::instrument(name = "Store a token", skip(self, token), fields(purpose = %token.purpose.as_ref()))]
    async fn insert(&self, token: &Token) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (token, purpose, owner_id, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&token.token)
        .bind(token.purpose.as_ref())
        .bind(token.owner_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find(&self, token: &str, purpose: TokenPurpose) -> RepositoryResult<Option<Token>> {
        let row = sqlx::query(
            r#"
            SELECT token, purpose, owner_id, issued_at, expires_at, consumed_at
            FROM tokens
            WHERE token = $1 AND purpose = $2
            "#,
        )
        .bind(token)
        .bind(purpose.as_ref())
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn find_active_for_owner(
        &self,
        owner_id: Uuid,
        purpose: TokenPurpose,
    ) -> RepositoryResult<Option<Token>> {
        let row = sqlx::query(
            r#"
            SELECT token, purpose, owner_id, issued_at, expires_at, consumed_at
            FROM tokens
            WHERE owner_id = $1 AND purpose = $2 AND consumed_at IS NULL
            ORDER BY issued_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(purpose.as_ref())
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn consume(&self, token: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE tokens SET consumed_at = $2 WHERE token = $1 AND consumed_at IS NULL",
        )
        .bind(token)
        .bind(at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AuditRepository for PostgresStore {
    async fn insert(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, subscriber_id, action, description, ip_address, user_agent,
                request_id, legal_basis, old_data, new_data, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.subscriber_id)
        .bind(entry.action.as_ref())
        .bind(&entry.description)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(&entry.request_id)
        .bind(entry.legal_basis.as_ref().map(AsRef::<str>::as_ref))
        .bind(&entry.old_data)
        .bind(&entry.new_data)
        .bind(entry.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn search(&self, query: &AuditQuery) -> RepositoryResult<(Vec<AuditEntry>, i64)> {
        let where_clause = r#"
            ($1::UUID IS NULL OR subscriber_id = $1)
            AND ($2::TEXT IS NULL OR ip_address LIKE '%' || $2 || '%')
            AND ($3::TEXT IS NULL OR action = $3)
            AND ($4::TEXT IS NULL OR description ILIKE '%' || $4 || '%')
            AND ($5::TIMESTAMPTZ IS NULL OR created_at >= $5)
            AND ($6::TIMESTAMPTZ IS NULL OR created_at <= $6)
        "#;
        let action = query.action.map(|action| action.as_ref().to_string());

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM audit_logs WHERE {}",
            where_clause
        ))
        .bind(query.subscriber_id)
        .bind(&query.ip)
        .bind(&action)
        .bind(&query.description)
        .bind(query.start)
        .bind(query.end)
        .fetch_one(&self.db_pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_logs WHERE {} ORDER BY created_at DESC LIMIT $7 OFFSET $8",
            AUDIT_COLUMNS, where_clause
        ))
        .bind(query.subscriber_id)
        .bind(&query.ip)
        .bind(&action)
        .bind(&query.description)
        .bind(query.start)
        .bind(query.end)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.db_pool)
        .await?;

        let entries = rows
            .iter()
            .map(audit_from_row)
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok((entries, total))
    }

    async fn find_by_subscriber(&self, subscriber_id: Uuid) -> RepositoryResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_logs WHERE subscriber_id = $1 ORDER BY created_at DESC",
            AUDIT_COLUMNS
        ))
        .bind(subscriber_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }

    #[tracing::instrument(name = "Delete audit entries past retention", skip(self))]
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RepositoryResult<AuditStats> {
        let total_count: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM audit_logs WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.db_pool)
        .await?
        .try_get("total")?;

        let action_counts = sqlx::query(
            r#"
            SELECT action AS key, COUNT(*) AS total
            FROM audit_logs
            WHERE created_at BETWEEN $1 AND $2
            GROUP BY action
            ORDER BY total DESC, key
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db_pool)
        .await?
        .iter()
        .map(|row| -> RepositoryResult<(String, i64)> {
            Ok((row.try_get("key")?, row.try_get("total")?))
        })
        .collect::<RepositoryResult<Vec<(String, i64)>>>()?;

        let legal_basis_counts = sqlx::query(
            r#"
            SELECT legal_basis AS key, COUNT(*) AS total
            FROM audit_logs
            WHERE created_at BETWEEN $1 AND $2 AND legal_basis IS NOT NULL
            GROUP BY legal_basis
            ORDER BY total DESC, key
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db_pool)
        .await?
        .iter()
        .map(|row| -> RepositoryResult<(String, i64)> {
            Ok((row.try_get("key")?, row.try_get("total")?))
        })
        .collect::<RepositoryResult<Vec<(String, i64)>>>()?;

        Ok(AuditStats {
            total_count,
            action_counts,
            legal_basis_counts,
        })
    }

    async fn recent(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_logs ORDER BY created_at DESC LIMIT $1",
            AUDIT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl ErasureRepository for PostgresStore {
    #[tracing::instrument(name = "Erase a data subject", skip(self, target), fields(request_id = %target.request_id))]
    async fn erase_subject(&self, target: &ErasureTarget) -> RepositoryResult<ErasedSubject> {
        let mut transaction = self.db_pool.begin().await?;
        let mut counts = ErasureCounts::default();

        // Detach the executing request first so the subscriber FK no longer points at it.
        sqlx::query(
            "UPDATE data_requests SET subscriber_id = NULL, request_email = NULL WHERE id = $1",
        )
        .bind(target.request_id)
        .execute(&mut transaction)
        .await?;

        if let Some(subscriber_id) = target.subscriber_id {
            counts.audit_logs = sqlx::query("DELETE FROM audit_logs WHERE subscriber_id = $1")
                .bind(subscriber_id)
                .execute(&mut transaction)
                .await?
                .rows_affected();
        }

        // Requests are matched by hash too: ones filed before subscribing carry no subscriber_id.
        counts.tokens = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE owner_id = $1
               OR owner_id IN (
                   SELECT id FROM data_requests
                   WHERE id <> $2 AND (email_hash = $3 OR subscriber_id = $1)
               )
            "#,
        )
        .bind(target.subscriber_id)
        .bind(target.request_id)
        .bind(target.email_hash.as_ref())
        .execute(&mut transaction)
        .await?
        .rows_affected();

        let deleted = sqlx::query(
            r#"
            DELETE FROM data_requests
            WHERE id <> $2 AND (email_hash = $3 OR subscriber_id = $1)
            RETURNING export_id
            "#,
        )
        .bind(target.subscriber_id)
        .bind(target.request_id)
        .bind(target.email_hash.as_ref())
        .fetch_all(&mut transaction)
        .await?;
        counts.data_requests = deleted.len() as u64;
        let export_ids = deleted
            .iter()
            .map(|row| row.try_get::<Option<Uuid>, _>("export_id"))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if let Some(subscriber_id) = target.subscriber_id {
            counts.subscribers = sqlx::query("DELETE FROM subscribers WHERE id = $1")
                .bind(subscriber_id)
                .execute(&mut transaction)
                .await?
                .rows_affected();
        }

        counts.consent_records =
            sqlx::query("DELETE FROM consent_records WHERE LOWER(email) = LOWER($1)")
                .bind(&target.email)
                .execute(&mut transaction)
                .await?
                .rows_affected();

        transaction.commit().await?;

        Ok(ErasedSubject { counts, export_ids })
    }
}

#[async_trait]
impl AdminRepository for PostgresStore {
    async fn insert(&self, admin: &AdminUser) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_users (
                id, email, password_hash, role, is_active, failed_login_attempts, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(admin.id)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_ref())
        .bind(admin.is_active)
        .bind(admin.failed_login_attempts)
        .bind(admin.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, is_active, failed_login_attempts,
                   locked_until, last_login_at, last_login_ip, created_at
            FROM admin_users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(admin_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<AdminUser>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, is_active, failed_login_attempts,
                   locked_until, last_login_at, last_login_ip, created_at
            FROM admin_users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(admin_from_row).transpose()
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE admin_users SET failed_login_attempts = $2, locked_until = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(failed_attempts)
        .bind(locked_until)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE admin_users
            SET failed_login_attempts = 0, locked_until = NULL, last_login_at = $2, last_login_ip = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(ip)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

use std::sync::Arc;

use crate::domain::audit::{AuditAction, AuditContext, NewAuditEntry};
use crate::domain::consent::{
    ConsentRecord, ConsentType, CookieConsent, LegalBasis, NewConsentRecord,
};
use crate::repository::{ConsentRepository, RepositoryResult};
use crate::services::{AuditLogger, SharedClock};

/// Placeholder owner of consent decisions made before any email is known.
pub const ANONYMOUS: &str = "anonymous";

/// Append-only record of consent decisions.
#[derive(Clone)]
pub struct ConsentLedger {
    consents: Arc<dyn ConsentRepository>,
    audit: AuditLogger,
    clock: SharedClock,
    consent_version: String,
}

impl ConsentLedger {
    pub fn new(
        consents: Arc<dyn ConsentRepository>,
        audit: AuditLogger,
        clock: SharedClock,
        consent_version: String,
    ) -> Self {
        ConsentLedger {
            consents,
            audit,
            clock,
            consent_version,
        }
    }

    pub fn consent_version(&self) -> &str {
        &self.consent_version
    }

    pub async fn record(&self, record: NewConsentRecord) -> RepositoryResult<ConsentRecord> {
        let record = record.into_record(self.clock.utc());
        self.consents.insert(&record).await?;

        Ok(record)
    }

    /// Consent to email marketing, given or withdrawn by `email`.
    pub async fn record_email_marketing(
        &self,
        email: &str,
        consent_given: bool,
        source: &str,
        context: &AuditContext,
    ) -> RepositoryResult<ConsentRecord> {
        let (legal_basis, purpose) = if consent_given {
            (LegalBasis::Consent, "Email marketing communications")
        } else {
            (
                LegalBasis::ConsentWithdrawn,
                "Withdrawal of consent to email marketing",
            )
        };

        self.record(NewConsentRecord {
            email: email.to_string(),
            consent_type: ConsentType::EmailMarketing,
            consent_given,
            consent_version: self.consent_version.clone(),
            legal_basis,
            purpose: purpose.to_string(),
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
            source: source.to_string(),
        })
        .await
    }

    #[tracing::instrument(name = "Record cookie consent", skip(self, context))]
    pub async fn record_cookie_consent(
        &self,
        preferences: CookieConsent,
        source: &str,
        context: &AuditContext,
    ) -> RepositoryResult<ConsentRecord> {
        let result = self
            .record(NewConsentRecord {
                email: ANONYMOUS.to_string(),
                consent_type: ConsentType::WebsiteCookies,
                consent_given: preferences.any_given(),
                consent_version: self.consent_version.clone(),
                legal_basis: LegalBasis::Consent,
                purpose: "Website cookie preferences".to_string(),
                ip: context.ip.clone(),
                user_agent: context.user_agent.clone(),
                source: source.to_string(),
            })
            .await;

        match &result {
            Ok(record) => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::ConsentRecorded,
                            "Cookie consent preferences recorded",
                        )
                        .legal_basis(LegalBasis::Consent)
                        .new_data(serde_json::json!({
                            "consentId": record.id,
                            "preferences": preferences,
                            "source": source,
                        })),
                        context,
                    )
                    .await;
            }
            Err(err) => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::ConsentRecordingError,
                            "Failed to record cookie consent",
                        )
                        .new_data(serde_json::json!({ "error": err.to_string() })),
                        context,
                    )
                    .await;
            }
        }

        result
    }

    pub async fn history(&self, email: &str) -> RepositoryResult<Vec<ConsentRecord>> {
        self.consents.find_by_email(email).await
    }
}

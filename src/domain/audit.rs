use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::consent::LegalBasis;

macro_rules! audit_actions {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Closed vocabulary of audited events.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum AuditAction {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl AuditAction {
            pub const ALL: &'static [AuditAction] = &[$(AuditAction::$variant),+];

            pub fn parse(action: String) -> Result<AuditAction, String> {
                match action.as_str() {
                    $($name => Ok(AuditAction::$variant),)+
                    _ => Err(format!("{} is not a known audit action", action)),
                }
            }
        }

        impl AsRef<str> for AuditAction {
            fn as_ref(&self) -> &str {
                match self {
                    $(AuditAction::$variant => $name,)+
                }
            }
        }
    };
}

audit_actions! {
    ConsentRecorded => "CONSENT_RECORDED",
    ConsentRecordingError => "CONSENT_RECORDING_ERROR",
    ConsentValidationFailed => "CONSENT_VALIDATION_FAILED",
    SubscriptionCreated => "SUBSCRIPTION_CREATED",
    SubscriptionReactivated => "SUBSCRIPTION_REACTIVATED",
    DuplicateSubscriptionAttempt => "DUPLICATE_SUBSCRIPTION_ATTEMPT",
    SubscriptionFailed => "SUBSCRIPTION_FAILED",
    SubscriptionError => "SUBSCRIPTION_ERROR",
    EmailVerified => "EMAIL_VERIFIED",
    VerificationFailed => "VERIFICATION_FAILED",
    VerificationExpired => "VERIFICATION_EXPIRED",
    VerificationResent => "VERIFICATION_RESENT",
    Unsubscribed => "UNSUBSCRIBED",
    UnsubscribeFailed => "UNSUBSCRIBE_FAILED",
    GdprRequestCreated => "GDPR_REQUEST_CREATED",
    GdprRequestVerified => "GDPR_REQUEST_VERIFIED",
    GdprRequestCompleted => "GDPR_REQUEST_COMPLETED",
    GdprRequestExpired => "GDPR_REQUEST_EXPIRED",
    GdprRequestFailed => "GDPR_REQUEST_FAILED",
    GdprVerificationFailed => "GDPR_VERIFICATION_FAILED",
    DataExportCreated => "DATA_EXPORT_CREATED",
    DataExportDownloaded => "DATA_EXPORT_DOWNLOADED",
    DataDeletionInitiated => "DATA_DELETION_INITIATED",
    DataDeletionCompleted => "DATA_DELETION_COMPLETED",
    DataRectificationRequested => "DATA_RECTIFICATION_REQUESTED",
    ProcessingRestricted => "PROCESSING_RESTRICTED",
    AdminLoginSuccess => "ADMIN_LOGIN_SUCCESS",
    AdminLoginFailed => "ADMIN_LOGIN_FAILED",
    AdminLoginBlocked => "ADMIN_LOGIN_BLOCKED",
    AdminAuthFailed => "ADMIN_AUTH_FAILED",
    AdminDataExport => "ADMIN_DATA_EXPORT",
    AuditRetentionCleanup => "AUDIT_RETENTION_CLEANUP",
}

/// Who triggered an action, as seen by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub subscriber_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub legal_basis: Option<LegalBasis>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An audit entry before it has been given an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub subscriber_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub legal_basis: Option<LegalBasis>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, description: impl Into<String>) -> NewAuditEntry {
        NewAuditEntry {
            subscriber_id: None,
            action,
            description: description.into(),
            legal_basis: None,
            old_data: None,
            new_data: None,
        }
    }

    pub fn subscriber(mut self, subscriber_id: Option<Uuid>) -> Self {
        self.subscriber_id = subscriber_id;
        self
    }

    pub fn legal_basis(mut self, legal_basis: LegalBasis) -> Self {
        self.legal_basis = Some(legal_basis);
        self
    }

    pub fn old_data(mut self, old_data: serde_json::Value) -> Self {
        self.old_data = Some(old_data);
        self
    }

    pub fn new_data(mut self, new_data: serde_json::Value) -> Self {
        self.new_data = Some(new_data);
        self
    }

    pub fn into_entry(self, context: &AuditContext, created_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            subscriber_id: self.subscriber_id,
            action: self.action,
            description: self.description,
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
            request_id: context.request_id.clone(),
            legal_basis: self.legal_basis,
            old_data: self.old_data,
            new_data: self.new_data,
            created_at,
        }
    }
}

/// Search filter after email resolution. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub subscriber_id: Option<Uuid>,
    pub ip: Option<String>,
    pub action: Option<AuditAction>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(subscriber_id) = self.subscriber_id {
            if entry.subscriber_id != Some(subscriber_id) {
                return false;
            }
        }
        if let Some(ip) = &self.ip {
            if !entry.ip.as_deref().is_some_and(|entry_ip| entry_ip.contains(ip.as_str())) {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(description) = &self.description {
            let needle = description.to_lowercase();
            if !entry.description.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.created_at > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: i64,
    pub has_more: bool,
}

impl AuditPage {
    pub fn empty() -> AuditPage {
        AuditPage {
            entries: Vec::new(),
            total: 0,
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_count: i64,
    pub action_counts: Vec<(String, i64)>,
    pub legal_basis_counts: Vec<(String, i64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use claim::assert_err;

    fn entry(action: AuditAction, ip: &str, description: &str) -> AuditEntry {
        NewAuditEntry::new(action, description).into_entry(
            &AuditContext {
                ip: Some(ip.to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn every_action_parses_from_its_name() {
        for action in AuditAction::ALL {
            assert_eq!(
                AuditAction::parse(action.as_ref().to_string()).unwrap(),
                *action
            );
        }
        assert_err!(AuditAction::parse("SOMETHING_ELSE".to_string()));
    }

    #[test]
    fn action_serializes_to_its_name() {
        let json = serde_json::to_value(AuditAction::DataDeletionCompleted).unwrap();

        assert_eq!(json, serde_json::json!("DATA_DELETION_COMPLETED"));
    }

    #[test]
    fn query_matches_ip_substring_and_description_case_insensitively() {
        let entry = entry(AuditAction::Unsubscribed, "10.0.0.12", "User unsubscribed");
        let query = AuditQuery {
            ip: Some("10.0.0".to_string()),
            description: Some("UNSUBSCRIBED".to_string()),
            ..Default::default()
        };

        assert!(query.matches(&entry));
    }

    #[test]
    fn query_rejects_entries_outside_date_range() {
        let entry = entry(AuditAction::EmailVerified, "1.1.1.1", "verified");
        let query = AuditQuery {
            start: Some(entry.created_at + Duration::seconds(1)),
            ..Default::default()
        };

        assert!(!query.matches(&entry));
    }

    #[test]
    fn query_filters_by_action() {
        let entry = entry(AuditAction::EmailVerified, "1.1.1.1", "verified");
        let query = AuditQuery {
            action: Some(AuditAction::Unsubscribed),
            ..Default::default()
        };

        assert!(!query.matches(&entry));
    }
}

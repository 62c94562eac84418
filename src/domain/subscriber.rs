use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::subscriber_email::{EmailHash, SubscriberEmail};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    #[serde(skip)]
    pub email_hash: EmailHash,
    pub consent_given: bool,
    pub consent_version: String,
    pub consent_timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub consent_ip: Option<String>,
    #[serde(skip)]
    pub consent_user_agent: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub source: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// Snapshot stored in audit entries. Carries the hash, never the address.
    pub fn audit_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "subscriberId": self.id,
            "emailHash": self.email_hash.as_ref(),
            "isActive": self.is_active,
            "isVerified": self.is_verified,
            "consentGiven": self.consent_given,
            "consentVersion": self.consent_version,
            "createdAt": self.created_at,
        })
    }
}

/// Filter used by the admin subscriber listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberFilter {
    #[default]
    All,
    Active,
    Inactive,
    Verified,
    Unverified,
}

impl SubscriberFilter {
    pub fn matches(&self, subscriber: &Subscriber) -> bool {
        match self {
            SubscriberFilter::All => true,
            SubscriberFilter::Active => subscriber.is_active,
            SubscriberFilter::Inactive => !subscriber.is_active,
            SubscriberFilter::Verified => subscriber.is_verified,
            SubscriberFilter::Unverified => !subscriber.is_verified,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub total: i64,
    pub active: i64,
    pub verified: i64,
    pub unverified: i64,
    pub recent_signups: i64,
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// GDPR Article 6 justification recorded alongside each processing act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    Consent,
    Contract,
    LegalObligation,
    VitalInterests,
    PublicTask,
    LegitimateInterests,
    ConsentWithdrawn,
}

impl LegalBasis {
    pub fn parse(basis: String) -> Result<LegalBasis, String> {
        match basis.as_str() {
            "consent" => Ok(LegalBasis::Consent),
            "contract" => Ok(LegalBasis::Contract),
            "legal_obligation" => Ok(LegalBasis::LegalObligation),
            "vital_interests" => Ok(LegalBasis::VitalInterests),
            "public_task" => Ok(LegalBasis::PublicTask),
            "legitimate_interests" => Ok(LegalBasis::LegitimateInterests),
            "consent_withdrawn" => Ok(LegalBasis::ConsentWithdrawn),
            _ => Err(format!("{} is not a valid legal basis", basis)),
        }
    }
}

impl AsRef<str> for LegalBasis {
    fn as_ref(&self) -> &str {
        match self {
            LegalBasis::Consent => "consent",
            LegalBasis::Contract => "contract",
            LegalBasis::LegalObligation => "legal_obligation",
            LegalBasis::VitalInterests => "vital_interests",
            LegalBasis::PublicTask => "public_task",
            LegalBasis::LegitimateInterests => "legitimate_interests",
            LegalBasis::ConsentWithdrawn => "consent_withdrawn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    EmailMarketing,
    WebsiteCookies,
}

impl ConsentType {
    pub fn parse(consent_type: String) -> Result<ConsentType, String> {
        match consent_type.as_str() {
            "email_marketing" => Ok(ConsentType::EmailMarketing),
            "website_cookies" => Ok(ConsentType::WebsiteCookies),
            _ => Err(format!("{} is not a valid consent type", consent_type)),
        }
    }
}

impl AsRef<str> for ConsentType {
    fn as_ref(&self) -> &str {
        match self {
            ConsentType::EmailMarketing => "email_marketing",
            ConsentType::WebsiteCookies => "website_cookies",
        }
    }
}

/// Immutable proof of a consent decision. Keeps the plain email so it
/// outlives the subscriber row it was given for.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub id: Uuid,
    pub email: String,
    pub consent_type: ConsentType,
    pub consent_given: bool,
    pub consent_version: String,
    pub legal_basis: LegalBasis,
    pub purpose: String,
    #[serde(skip)]
    pub ip: Option<String>,
    #[serde(skip)]
    pub user_agent: Option<String>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

pub struct NewConsentRecord {
    pub email: String,
    pub consent_type: ConsentType,
    pub consent_given: bool,
    pub consent_version: String,
    pub legal_basis: LegalBasis,
    pub purpose: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub source: String,
}

impl NewConsentRecord {
    pub fn into_record(self, timestamp: DateTime<Utc>) -> ConsentRecord {
        ConsentRecord {
            id: Uuid::new_v4(),
            email: self.email,
            consent_type: self.consent_type,
            consent_given: self.consent_given,
            consent_version: self.consent_version,
            legal_basis: self.legal_basis,
            purpose: self.purpose,
            ip: self.ip,
            user_agent: self.user_agent,
            source: self.source,
            timestamp,
        }
    }
}

/// Cookie banner choices posted by the website.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CookieConsent {
    pub essential: bool,
    pub analytics: bool,
    pub marketing: bool,
}

impl CookieConsent {
    pub fn any_given(&self) -> bool {
        self.essential || self.analytics || self.marketing
    }
}

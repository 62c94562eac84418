use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    Unsubscribe,
    DsrVerification,
}

impl TokenPurpose {
    pub fn parse(purpose: String) -> Result<TokenPurpose, String> {
        match purpose.as_str() {
            "email_verification" => Ok(TokenPurpose::EmailVerification),
            "unsubscribe" => Ok(TokenPurpose::Unsubscribe),
            "dsr_verification" => Ok(TokenPurpose::DsrVerification),
            _ => Err(format!("{} is not a valid token purpose", purpose)),
        }
    }
}

impl AsRef<str> for TokenPurpose {
    fn as_ref(&self) -> &str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::Unsubscribe => "unsubscribe",
            TokenPurpose::DsrVerification => "dsr_verification",
        }
    }
}

/// A single-use credential owned by a subscriber or a data request.
#[derive(Debug, Clone)]
pub struct Token {
    pub token: String,
    pub purpose: TokenPurpose,
    pub owner_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Still valid at exactly `expires_at`, expired one instant later.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

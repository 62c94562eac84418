use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber_email::EmailHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Export,
    Delete,
    Rectify,
    Restrict,
    Portability,
}

impl RequestType {
    pub fn parse(request_type: String) -> Result<RequestType, String> {
        match request_type.as_str() {
            "EXPORT" => Ok(RequestType::Export),
            "DELETE" => Ok(RequestType::Delete),
            "RECTIFY" => Ok(RequestType::Rectify),
            "RESTRICT" => Ok(RequestType::Restrict),
            "PORTABILITY" => Ok(RequestType::Portability),
            _ => Err(format!("{} is not a valid request type", request_type)),
        }
    }
}

impl AsRef<str> for RequestType {
    fn as_ref(&self) -> &str {
        match self {
            RequestType::Export => "EXPORT",
            RequestType::Delete => "DELETE",
            RequestType::Rectify => "RECTIFY",
            RequestType::Restrict => "RESTRICT",
            RequestType::Portability => "PORTABILITY",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub id: Uuid,
    pub subscriber_id: Option<Uuid>,
    /// Cleared once the subject has been erased.
    pub request_email: Option<String>,
    #[serde(skip)]
    pub email_hash: EmailHash,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub verification_sent_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub export_id: Option<Uuid>,
    pub export_url: Option<String>,
    pub export_expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DataRequest {
    pub fn new(
        subscriber_id: Option<Uuid>,
        request_email: String,
        request_type: RequestType,
        now: DateTime<Utc>,
    ) -> DataRequest {
        DataRequest {
            id: Uuid::new_v4(),
            subscriber_id,
            email_hash: EmailHash::of(&request_email),
            request_email: Some(request_email),
            request_type,
            status: RequestStatus::Pending,
            verification_sent_at: now,
            verified_at: None,
            processed_at: None,
            export_id: None,
            export_url: None,
            export_expires_at: None,
            notes: None,
            created_at: now,
        }
    }

    pub fn status_view(&self) -> DataRequestStatusView {
        DataRequestStatusView {
            id: self.id,
            request_type: self.request_type,
            status: self.status,
            created_at: self.created_at,
            processed_at: self.processed_at,
            export_expires_at: self.export_expires_at,
            notes: self.notes.clone(),
        }
    }
}

/// Public projection returned by the request status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequestStatusView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub export_expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Columns written together with a status transition. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestUpdate {
    pub verified_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub export_id: Option<Uuid>,
    pub export_url: Option<String>,
    pub export_expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl RequestUpdate {
    pub fn apply(self, request: &mut DataRequest) {
        if let Some(verified_at) = self.verified_at {
            request.verified_at = Some(verified_at);
        }
        if let Some(processed_at) = self.processed_at {
            request.processed_at = Some(processed_at);
        }
        if let Some(export_id) = self.export_id {
            request.export_id = Some(export_id);
        }
        if let Some(export_url) = self.export_url {
            request.export_url = Some(export_url);
        }
        if let Some(export_expires_at) = self.export_expires_at {
            request.export_expires_at = Some(export_expires_at);
        }
        if let Some(notes) = self.notes {
            request.notes = Some(notes);
        }
    }
}

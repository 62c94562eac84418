/// Lifecycle of a data-subject request.
///
/// `Pending -> Verified -> Completed` is the happy path, `Pending -> Expired`
/// happens when the verification link is used too late. `Verified -> Pending`
/// puts a request back in the queue after its processor failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Verified,
    Completed,
    Expired,
}

impl RequestStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Expired)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        matches!(
            (self, next),
            (Pending, Verified) | (Pending, Expired) | (Verified, Completed) | (Verified, Pending)
        )
    }

    pub fn parse(status: String) -> Result<RequestStatus, String> {
        match status.as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "VERIFIED" => Ok(RequestStatus::Verified),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "EXPIRED" => Ok(RequestStatus::Expired),
            _ => Err(format!("{} is not a valid request status", status)),
        }
    }
}

impl AsRef<str> for RequestStatus {
    fn as_ref(&self) -> &str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Verified => "VERIFIED",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

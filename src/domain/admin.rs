use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Viewer,
}

impl AdminRole {
    /// Roles allowed to read or export personal data from the admin surface.
    pub fn can_read_personal_data(&self) -> bool {
        matches!(self, AdminRole::SuperAdmin | AdminRole::Admin)
    }

    pub fn parse(role: String) -> Result<AdminRole, String> {
        match role.as_str() {
            "SUPER_ADMIN" => Ok(AdminRole::SuperAdmin),
            "ADMIN" => Ok(AdminRole::Admin),
            "VIEWER" => Ok(AdminRole::Viewer),
            _ => Err(format!("{} is not a valid admin role", role)),
        }
    }
}

impl AsRef<str> for AdminRole {
    fn as_ref(&self) -> &str {
        match self {
            AdminRole::SuperAdmin => "SUPER_ADMIN",
            AdminRole::Admin => "ADMIN",
            AdminRole::Viewer => "VIEWER",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdminUser {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|locked_until| now < locked_until)
    }
}

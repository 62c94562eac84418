use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

use crate::config::AdminSettings;
use crate::domain::admin::{AdminRole, AdminUser};
use crate::domain::audit::{AuditAction, AuditContext, NewAuditEntry};
use crate::repository::{AdminRepository, RepositoryError};
use crate::services::{AuditLogger, SharedClock};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: Uuid,
    email: String,
    role: AdminRole,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AdminProfile {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
}

impl From<&AdminUser> for AdminProfile {
    fn from(admin: &AdminUser) -> Self {
        AdminProfile {
            id: admin.id,
            email: admin.email.clone(),
            role: admin.role,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AdminSession {
    pub token: String,
    pub admin: AdminProfile,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is locked until {0}")]
    Locked(DateTime<Utc>),
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("Failed to access admin storage")]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Unexpected(String),
}

/// Password login with lockout, and bearer-token checks for the admin surface.
#[derive(Clone)]
pub struct AdminAuth {
    admins: Arc<dyn AdminRepository>,
    audit: AuditLogger,
    clock: SharedClock,
    jwt_secret: Secret<String>,
    jwt_expiry: Duration,
    max_failed_logins: i32,
    lockout: Duration,
}

impl AdminAuth {
    pub fn new(
        admins: Arc<dyn AdminRepository>,
        audit: AuditLogger,
        clock: SharedClock,
        settings: &AdminSettings,
    ) -> Self {
        AdminAuth {
            admins,
            audit,
            clock,
            jwt_secret: settings.jwt_secret.clone(),
            jwt_expiry: settings.get_jwt_expiry(),
            max_failed_logins: settings.max_failed_logins,
            lockout: settings.get_lockout(),
        }
    }

    #[tracing::instrument(name = "Admin login", skip(self, password, context))]
    pub async fn login(
        &self,
        email: &str,
        password: Secret<String>,
        context: &AuditContext,
    ) -> Result<AdminSession, AdminAuthError> {
        let admin = match self.admins.find_by_email(email.trim()).await? {
            Some(admin) if admin.is_active => admin,
            _ => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::AdminLoginFailed,
                            "Admin login for an unknown or inactive account",
                        ),
                        context,
                    )
                    .await;
                return Err(AdminAuthError::InvalidCredentials);
            }
        };

        let now = self.clock.utc();
        if let Some(locked_until) = admin.locked_until.filter(|_| admin.is_locked(now)) {
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::AdminLoginBlocked, "Login to a locked admin account")
                        .new_data(serde_json::json!({
                            "adminId": admin.id,
                            "lockedUntil": locked_until,
                        })),
                    context,
                )
                .await;
            return Err(AdminAuthError::Locked(locked_until));
        }

        if !self.password_matches(&admin, password).await? {
            // A lock that has run out starts a fresh count.
            let previous = if admin.locked_until.is_some() {
                0
            } else {
                admin.failed_login_attempts
            };
            let failed_attempts = previous + 1;
            let locked_until =
                (failed_attempts >= self.max_failed_logins).then(|| now + self.lockout);
            self.admins
                .record_failed_login(admin.id, failed_attempts, locked_until)
                .await?;
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::AdminLoginFailed, "Admin login with a wrong password")
                        .new_data(serde_json::json!({
                            "adminId": admin.id,
                            "failedAttempts": failed_attempts,
                            "lockedUntil": locked_until,
                        })),
                    context,
                )
                .await;
            return Err(AdminAuthError::InvalidCredentials);
        }

        self.admins
            .record_successful_login(admin.id, now, context.ip.clone())
            .await?;
        let token = self.issue_token(&admin, now)?;
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::AdminLoginSuccess, "Admin logged in")
                    .new_data(serde_json::json!({
                        "adminId": admin.id,
                        "role": admin.role,
                    })),
                context,
            )
            .await;

        Ok(AdminSession {
            token,
            admin: AdminProfile::from(&admin),
        })
    }

    /// Resolves a bearer token to an active admin allowed to read personal data.
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        context: &AuditContext,
    ) -> Result<AdminProfile, AdminAuthError> {
        let result = self.try_authenticate(bearer).await;

        if let Err(err) = &result {
            if !matches!(err, AdminAuthError::Repository(_)) {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::AdminAuthFailed,
                            "Rejected admin API request",
                        )
                        .new_data(serde_json::json!({ "reason": err.to_string() })),
                        context,
                    )
                    .await;
            }
        }

        result
    }

    async fn try_authenticate(&self, bearer: Option<&str>) -> Result<AdminProfile, AdminAuthError> {
        let token = bearer.ok_or(AdminAuthError::MissingToken)?;
        let claims = self.decode_token(token)?;
        if claims.exp <= self.clock.utc().timestamp() {
            return Err(AdminAuthError::InvalidToken);
        }

        let admin = self
            .admins
            .find_by_id(claims.sub)
            .await?
            .filter(|admin| admin.is_active)
            .ok_or(AdminAuthError::InvalidToken)?;
        if !admin.role.can_read_personal_data() {
            return Err(AdminAuthError::Forbidden);
        }

        Ok(AdminProfile::from(&admin))
    }

    fn issue_token(&self, admin: &AdminUser, now: DateTime<Utc>) -> Result<String, AdminAuthError> {
        let claims = Claims {
            sub: admin.id,
            email: admin.email.clone(),
            role: admin.role,
            iat: now.timestamp(),
            exp: (now + self.jwt_expiry).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes()),
        )
        .map_err(|err| AdminAuthError::Unexpected(format!("Token generation failed: {}", err)))
    }

    /// Signature only; expiry is checked against the injected clock.
    fn decode_token(&self, token: &str) -> Result<Claims, AdminAuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| AdminAuthError::InvalidToken)
    }

    async fn password_matches(
        &self,
        admin: &AdminUser,
        password: Secret<String>,
    ) -> Result<bool, AdminAuthError> {
        let password_hash = admin.password_hash.clone();

        tokio::task::spawn_blocking(move || verify_password(&password_hash, password))
            .await
            .map_err(|err| AdminAuthError::Unexpected(format!("Password check panicked: {}", err)))?
    }
}

pub fn hash_password(password: &Secret<String>) -> Result<String, AdminAuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());

    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AdminAuthError::Unexpected(format!("Password hashing failed: {}", err)))
}

fn verify_password(password_hash: &str, password: Secret<String>) -> Result<bool, AdminAuthError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AdminAuthError::Unexpected(format!("Invalid password hash: {}", err)))?;

    Ok(Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed_hash)
        .is_ok())
}

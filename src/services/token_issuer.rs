use std::sync::Arc;

use chrono::Duration;
use rand::RngCore;
use uuid::Uuid;

use crate::config::TokenSettings;
use crate::domain::token::{Token, TokenPurpose};
use crate::repository::{RepositoryResult, TokenRepository};
use crate::services::SharedClock;

const TOKEN_BYTES: usize = 32;

/// Expiry window per token purpose. `None` means the token never expires.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub email_verification: Duration,
    pub dsr_verification: Duration,
    pub export_link: Duration,
}

impl TokenPolicy {
    pub fn expiry_for(&self, purpose: TokenPurpose) -> Option<Duration> {
        match purpose {
            TokenPurpose::EmailVerification => Some(self.email_verification),
            TokenPurpose::DsrVerification => Some(self.dsr_verification),
            TokenPurpose::Unsubscribe => None,
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        TokenPolicy {
            email_verification: Duration::hours(24),
            dsr_verification: Duration::days(7),
            export_link: Duration::hours(72),
        }
    }
}

impl From<&TokenSettings> for TokenPolicy {
    fn from(settings: &TokenSettings) -> Self {
        TokenPolicy {
            email_verification: settings.email_verification_window(),
            dsr_verification: settings.dsr_verification_window(),
            export_link: settings.export_link_window(),
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenRepository>,
    clock: SharedClock,
    policy: TokenPolicy,
}

impl TokenIssuer {
    pub fn new(tokens: Arc<dyn TokenRepository>, clock: SharedClock, policy: TokenPolicy) -> Self {
        TokenIssuer {
            tokens,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    #[tracing::instrument(name = "Issue a token", skip(self), fields(purpose = %purpose.as_ref()))]
    pub async fn issue(&self, purpose: TokenPurpose, owner_id: Uuid) -> RepositoryResult<Token> {
        let issued_at = self.clock.utc();
        let token = Token {
            token: generate_token(),
            purpose,
            owner_id,
            issued_at,
            expires_at: self.policy.expiry_for(purpose).map(|window| issued_at + window),
            consumed_at: None,
        };

        self.tokens.insert(&token).await?;

        Ok(token)
    }

    pub async fn find(&self, token: &str, purpose: TokenPurpose) -> RepositoryResult<Option<Token>> {
        self.tokens.find(token, purpose).await
    }

    /// Newest unconsumed token of `purpose` for the owner, issuing one when none is left.
    pub async fn current_or_issue(
        &self,
        purpose: TokenPurpose,
        owner_id: Uuid,
    ) -> RepositoryResult<Token> {
        match self.tokens.find_active_for_owner(owner_id, purpose).await? {
            Some(token) => Ok(token),
            None => self.issue(purpose, owner_id).await,
        }
    }

    /// Returns `false` when the token had already been consumed.
    pub async fn consume(&self, token: &str) -> RepositoryResult<bool> {
        self.tokens.consume(token, self.clock.utc()).await
    }
}

/// 256 bits from the thread-local CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    hex::encode(bytes)
}

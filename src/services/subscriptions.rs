use std::sync::Arc;

use uuid::Uuid;

use crate::domain::audit::{AuditAction, AuditContext, NewAuditEntry};
use crate::domain::consent::LegalBasis;
use crate::domain::new_subscriber::{NewSubscriber, NewSubscriberBody};
use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::token::TokenPurpose;
use crate::repository::{Reactivation, RepositoryError, SubscriberRepository};
use crate::services::{AuditLogger, ConsentLedger, Notifier, SharedClock, TokenIssuer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created { subscriber_id: Uuid },
    Reactivated { subscriber_id: Uuid },
    AlreadyPending,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyEmailOutcome {
    Verified,
    AlreadyVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    AlreadyUnsubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    /// Also returned for unknown addresses so the endpoint cannot be used to
    /// find out who is subscribed.
    Neutral,
    AlreadyVerified,
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Consent is required for email subscription")]
    ConsentRequired,
    #[error("{0}")]
    Validation(String),
    #[error("Invalid or unknown token")]
    UnknownToken,
    #[error("Verification token has expired")]
    TokenExpired,
    #[error("This subscription is no longer active. Please subscribe again.")]
    Inactive,
    #[error("Failed to access subscription storage")]
    Repository(#[from] RepositoryError),
}

/// Opt-in, verification and withdrawal of email marketing consent.
#[derive(Clone)]
pub struct SubscriptionService {
    subscribers: Arc<dyn SubscriberRepository>,
    tokens: TokenIssuer,
    consents: ConsentLedger,
    audit: AuditLogger,
    notifier: Notifier,
    clock: SharedClock,
}

impl SubscriptionService {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        tokens: TokenIssuer,
        consents: ConsentLedger,
        audit: AuditLogger,
        notifier: Notifier,
        clock: SharedClock,
    ) -> Self {
        SubscriptionService {
            subscribers,
            tokens,
            consents,
            audit,
            notifier,
            clock,
        }
    }

    #[tracing::instrument(
        name = "Subscribe an email address",
        skip(self, body, context),
        fields(source = ?body.source)
    )]
    pub async fn subscribe(
        &self,
        body: &NewSubscriberBody,
        context: &AuditContext,
    ) -> Result<SubscribeOutcome, SubscriptionError> {
        if !body.has_explicit_consent() {
            self.audit
                .record(
                    NewAuditEntry::new(
                        AuditAction::ConsentValidationFailed,
                        "Subscription rejected: explicit consent missing",
                    )
                    .new_data(serde_json::json!({ "consent": body.consent })),
                    context,
                )
                .await;
            return Err(SubscriptionError::ConsentRequired);
        }

        let new_subscriber = match NewSubscriber::try_from(body) {
            Ok(new_subscriber) => new_subscriber,
            Err(err) => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::SubscriptionFailed,
                            "Subscription rejected: invalid input",
                        )
                        .new_data(serde_json::json!({ "error": err })),
                        context,
                    )
                    .await;
                return Err(SubscriptionError::Validation(err));
            }
        };

        match self.try_subscribe(&new_subscriber, context).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::SubscriptionError,
                            "Subscription failed with an internal error",
                        )
                        .new_data(serde_json::json!({
                            "emailHash": new_subscriber.email.hash(),
                            "error": err.to_string(),
                        })),
                        context,
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn try_subscribe(
        &self,
        new_subscriber: &NewSubscriber,
        context: &AuditContext,
    ) -> Result<SubscribeOutcome, SubscriptionError> {
        let email_hash = new_subscriber.email.hash();

        if let Some(existing) = self.subscribers.find_by_email_hash(&email_hash).await? {
            return self.resubscribe(existing, new_subscriber, context).await;
        }

        let subscriber = self.build_subscriber(new_subscriber, context);
        match self.subscribers.insert(&subscriber).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                // A concurrent subscribe inserted the same address first.
                let existing = self
                    .subscribers
                    .find_by_email_hash(&email_hash)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::Query("subscriber vanished after a conflict".into())
                    })?;
                return self.resubscribe(existing, new_subscriber, context).await;
            }
            Err(err) => return Err(err.into()),
        }

        self.consents
            .record_email_marketing(
                subscriber.email.as_ref(),
                true,
                new_subscriber.source.as_ref(),
                context,
            )
            .await?;
        let verification = self
            .tokens
            .issue(TokenPurpose::EmailVerification, subscriber.id)
            .await?;
        self.tokens
            .issue(TokenPurpose::Unsubscribe, subscriber.id)
            .await?;

        self.notifier
            .send_verification(&subscriber.email, &verification.token)
            .await;
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::SubscriptionCreated, "New email subscription")
                    .subscriber(Some(subscriber.id))
                    .legal_basis(LegalBasis::Consent)
                    .new_data(subscriber.audit_snapshot()),
                context,
            )
            .await;

        Ok(SubscribeOutcome::Created {
            subscriber_id: subscriber.id,
        })
    }

    async fn resubscribe(
        &self,
        existing: Subscriber,
        new_subscriber: &NewSubscriber,
        context: &AuditContext,
    ) -> Result<SubscribeOutcome, SubscriptionError> {
        if existing.is_active {
            let outcome = if existing.is_verified {
                SubscribeOutcome::AlreadySubscribed
            } else {
                SubscribeOutcome::AlreadyPending
            };
            self.audit
                .record(
                    NewAuditEntry::new(
                        AuditAction::DuplicateSubscriptionAttempt,
                        "Subscription attempt for an already active address",
                    )
                    .subscriber(Some(existing.id))
                    .new_data(serde_json::json!({ "isVerified": existing.is_verified })),
                    context,
                )
                .await;
            return Ok(outcome);
        }

        let reactivation = Reactivation {
            consent_version: self.consents.consent_version().to_string(),
            consent_ip: context.ip.clone(),
            consent_user_agent: context.user_agent.clone(),
            source: new_subscriber.source.as_ref().to_string(),
            utm_source: tag(&new_subscriber.utm_source),
            utm_medium: tag(&new_subscriber.utm_medium),
            utm_campaign: tag(&new_subscriber.utm_campaign),
            at: self.clock.utc(),
        };
        if !self
            .subscribers
            .reactivate(existing.id, &reactivation)
            .await?
        {
            // Somebody else reactivated it between our read and write.
            return Ok(SubscribeOutcome::AlreadyPending);
        }

        self.consents
            .record_email_marketing(
                existing.email.as_ref(),
                true,
                new_subscriber.source.as_ref(),
                context,
            )
            .await?;
        let verification = self
            .tokens
            .issue(TokenPurpose::EmailVerification, existing.id)
            .await?;

        self.notifier
            .send_verification(&existing.email, &verification.token)
            .await;
        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::SubscriptionReactivated,
                    "Inactive subscription reactivated",
                )
                .subscriber(Some(existing.id))
                .legal_basis(LegalBasis::Consent)
                .old_data(existing.audit_snapshot())
                .new_data(serde_json::json!({
                    "isActive": true,
                    "consentVersion": reactivation.consent_version,
                    "source": reactivation.source,
                })),
                context,
            )
            .await;

        Ok(SubscribeOutcome::Reactivated {
            subscriber_id: existing.id,
        })
    }

    fn build_subscriber(&self, new_subscriber: &NewSubscriber, context: &AuditContext) -> Subscriber {
        let now = self.clock.utc();

        Subscriber {
            id: Uuid::new_v4(),
            email: new_subscriber.email.clone(),
            email_hash: new_subscriber.email.hash(),
            consent_given: true,
            consent_version: self.consents.consent_version().to_string(),
            consent_timestamp: now,
            consent_ip: context.ip.clone(),
            consent_user_agent: context.user_agent.clone(),
            is_verified: false,
            is_active: true,
            source: new_subscriber.source.as_ref().to_string(),
            utm_source: tag(&new_subscriber.utm_source),
            utm_medium: tag(&new_subscriber.utm_medium),
            utm_campaign: tag(&new_subscriber.utm_campaign),
            created_at: now,
            updated_at: now,
            verified_at: None,
            unsubscribed_at: None,
        }
    }

    #[tracing::instrument(name = "Verify an email address", skip(self, token, context))]
    pub async fn verify_email(
        &self,
        token: &str,
        context: &AuditContext,
    ) -> Result<VerifyEmailOutcome, SubscriptionError> {
        let token = self
            .tokens
            .find(token, TokenPurpose::EmailVerification)
            .await?;
        let subscriber = match &token {
            Some(token) => self.subscribers.find_by_id(token.owner_id).await?,
            None => None,
        };
        let (token, subscriber) = match (token, subscriber) {
            (Some(token), Some(subscriber)) => (token, subscriber),
            _ => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::VerificationFailed,
                            "Email verification with an unknown token",
                        ),
                        context,
                    )
                    .await;
                return Err(SubscriptionError::UnknownToken);
            }
        };

        if token.is_consumed() || subscriber.is_verified {
            return Ok(VerifyEmailOutcome::AlreadyVerified);
        }

        let now = self.clock.utc();
        if token.is_expired(now) {
            self.audit
                .record(
                    NewAuditEntry::new(
                        AuditAction::VerificationExpired,
                        "Email verification with an expired token",
                    )
                    .subscriber(Some(subscriber.id))
                    .new_data(serde_json::json!({ "expiredAt": token.expires_at })),
                    context,
                )
                .await;
            return Err(SubscriptionError::TokenExpired);
        }

        // The verified flag decides the winner; the token is spent only once it is set.
        if !self.subscribers.mark_verified(subscriber.id, now).await? {
            return Ok(VerifyEmailOutcome::AlreadyVerified);
        }
        self.tokens.consume(&token.token).await?;

        let unsubscribe = self
            .tokens
            .current_or_issue(TokenPurpose::Unsubscribe, subscriber.id)
            .await?;
        self.notifier
            .send_welcome(&subscriber.email, &unsubscribe.token)
            .await;
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::EmailVerified, "Email address verified")
                    .subscriber(Some(subscriber.id))
                    .legal_basis(LegalBasis::Consent)
                    .old_data(serde_json::json!({ "isVerified": false }))
                    .new_data(serde_json::json!({ "isVerified": true, "verifiedAt": now })),
                context,
            )
            .await;

        Ok(VerifyEmailOutcome::Verified)
    }

    #[tracing::instrument(name = "Unsubscribe an email address", skip(self, token, context))]
    pub async fn unsubscribe(
        &self,
        token: &str,
        context: &AuditContext,
    ) -> Result<UnsubscribeOutcome, SubscriptionError> {
        let token = self.tokens.find(token, TokenPurpose::Unsubscribe).await?;
        let subscriber = match &token {
            Some(token) => self.subscribers.find_by_id(token.owner_id).await?,
            None => None,
        };
        let subscriber = match subscriber {
            Some(subscriber) => subscriber,
            None => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::UnsubscribeFailed,
                            "Unsubscribe with an unknown token",
                        ),
                        context,
                    )
                    .await;
                return Err(SubscriptionError::UnknownToken);
            }
        };

        if !subscriber.is_active {
            return Ok(UnsubscribeOutcome::AlreadyUnsubscribed);
        }

        let now = self.clock.utc();
        if !self.subscribers.unsubscribe(subscriber.id, now).await? {
            return Ok(UnsubscribeOutcome::AlreadyUnsubscribed);
        }

        self.consents
            .record_email_marketing(subscriber.email.as_ref(), false, "unsubscribe", context)
            .await?;
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::Unsubscribed, "Subscriber withdrew consent")
                    .subscriber(Some(subscriber.id))
                    .legal_basis(LegalBasis::ConsentWithdrawn)
                    .old_data(serde_json::json!({ "isActive": true }))
                    .new_data(serde_json::json!({ "isActive": false, "unsubscribedAt": now })),
                context,
            )
            .await;

        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    #[tracing::instrument(name = "Resend a verification email", skip(self, email, context))]
    pub async fn resend_verification(
        &self,
        email: String,
        context: &AuditContext,
    ) -> Result<ResendOutcome, SubscriptionError> {
        let email = SubscriberEmail::parse(email).map_err(SubscriptionError::Validation)?;
        let subscriber = match self.subscribers.find_by_email_hash(&email.hash()).await? {
            Some(subscriber) => subscriber,
            None => return Ok(ResendOutcome::Neutral),
        };

        if subscriber.is_verified {
            return Ok(ResendOutcome::AlreadyVerified);
        }
        if !subscriber.is_active {
            return Err(SubscriptionError::Inactive);
        }

        let verification = self
            .tokens
            .issue(TokenPurpose::EmailVerification, subscriber.id)
            .await?;
        self.notifier
            .send_verification(&subscriber.email, &verification.token)
            .await;
        self.audit
            .record(
                NewAuditEntry::new(AuditAction::VerificationResent, "Verification email resent")
                    .subscriber(Some(subscriber.id)),
                context,
            )
            .await;

        Ok(ResendOutcome::Sent)
    }
}

fn tag(tag: &Option<crate::domain::attribution_tag::AttributionTag>) -> Option<String> {
    tag.as_ref().map(|tag| tag.as_ref().to_string())
}

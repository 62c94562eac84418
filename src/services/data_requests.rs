use uuid::Uuid;

use crate::domain::audit::{AuditAction, AuditContext, NewAuditEntry};
use crate::domain::consent::LegalBasis;
use crate::domain::data_request::{
    DataRequest, DataRequestStatusView, RequestType, RequestUpdate,
};
use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::token::TokenPurpose;
use crate::repository::{RepositoryError, RepositoryResult, Repositories};
use crate::services::export::ExportFormat;
use crate::services::{
    AuditLogger, DeletionProcessor, ExportProcessor, Notifier, SharedClock, TokenIssuer,
};

const RECTIFICATION_NOTE: &str =
    "Data rectification requires manual review. Our team will contact you within 30 days.";

/// What a type-specific processor hands back to the state machine: the
/// columns to write with the completion and the payload for the requester.
#[derive(Debug)]
pub struct ProcessorOutcome {
    pub update: RequestUpdate,
    pub data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("the request no longer carries an email address")]
    Redacted,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to write the export artifact")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize the export document")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum VerifyRequestOutcome {
    Processed {
        request_type: RequestType,
        data: serde_json::Value,
    },
    /// The request had already left `PENDING`, possibly through a concurrent call.
    AlreadyProcessed { status: RequestStatus },
}

#[derive(Debug, thiserror::Error)]
pub enum DataRequestError {
    #[error("{0}")]
    Validation(String),
    #[error("Request not found")]
    NotFound,
    #[error("Verification link has expired")]
    TokenExpired,
    #[error("Failed to process the request")]
    Processing(#[source] ProcessorError),
    #[error("Failed to access data request storage")]
    Repository(#[from] RepositoryError),
}

/// Lifecycle of data-subject requests: submission, email verification,
/// dispatch to the processor for the request type and completion.
#[derive(Clone)]
pub struct DataRequestService {
    repositories: Repositories,
    tokens: TokenIssuer,
    audit: AuditLogger,
    notifier: Notifier,
    exports: ExportProcessor,
    deletions: DeletionProcessor,
    clock: SharedClock,
}

impl DataRequestService {
    pub fn new(
        repositories: Repositories,
        tokens: TokenIssuer,
        audit: AuditLogger,
        notifier: Notifier,
        exports: ExportProcessor,
        deletions: DeletionProcessor,
        clock: SharedClock,
    ) -> Self {
        DataRequestService {
            repositories,
            tokens,
            audit,
            notifier,
            exports,
            deletions,
            clock,
        }
    }

    #[tracing::instrument(
        name = "Submit a data subject request",
        skip(self, email, context),
        fields(request_type = %request_type.as_ref())
    )]
    pub async fn submit(
        &self,
        email: String,
        request_type: RequestType,
        context: &AuditContext,
    ) -> Result<DataRequest, DataRequestError> {
        let email = SubscriberEmail::parse(email).map_err(DataRequestError::Validation)?;
        let subscriber = self
            .repositories
            .subscribers
            .find_by_email_hash(&email.hash())
            .await?;

        let request = DataRequest::new(
            subscriber.as_ref().map(|subscriber| subscriber.id),
            email.as_ref().to_string(),
            request_type,
            self.clock.utc(),
        );
        self.repositories.data_requests.insert(&request).await?;
        let token = self
            .tokens
            .issue(TokenPurpose::DsrVerification, request.id)
            .await?;

        self.notifier
            .send_data_request_verification(&email, request_type, &token.token)
            .await;
        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::GdprRequestCreated,
                    format!("{} request submitted", request_type.as_ref()),
                )
                .legal_basis(LegalBasis::LegalObligation)
                .new_data(serde_json::json!({
                    "dataRequestId": request.id,
                    "requestType": request_type,
                    "emailHash": request.email_hash.as_ref(),
                    "subscriberFound": subscriber.is_some(),
                })),
                context,
            )
            .await;

        Ok(request)
    }

    #[tracing::instrument(name = "Verify a data subject request", skip(self, token, context))]
    pub async fn verify(
        &self,
        token: &str,
        context: &AuditContext,
    ) -> Result<VerifyRequestOutcome, DataRequestError> {
        let token = self
            .tokens
            .find(token, TokenPurpose::DsrVerification)
            .await?;
        let request = match &token {
            Some(token) => {
                self.repositories
                    .data_requests
                    .find_by_id(token.owner_id)
                    .await?
            }
            None => None,
        };
        let (token, request) = match (token, request) {
            (Some(token), Some(request)) => (token, request),
            _ => {
                self.audit
                    .record(
                        NewAuditEntry::new(
                            AuditAction::GdprVerificationFailed,
                            "Data request verification with an unknown token",
                        ),
                        context,
                    )
                    .await;
                return Err(DataRequestError::NotFound);
            }
        };

        if !request.status.is_pending() {
            return Ok(VerifyRequestOutcome::AlreadyProcessed {
                status: request.status,
            });
        }

        let now = self.clock.utc();
        if now - request.verification_sent_at > self.tokens.policy().dsr_verification {
            let expired = self
                .transition(
                    &request,
                    RequestStatus::Pending,
                    RequestStatus::Expired,
                    RequestUpdate::default(),
                )
                .await?;
            if !expired {
                return self.already_processed(request.id).await;
            }
            self.record_transition(
                &request,
                AuditAction::GdprRequestExpired,
                "Data request verification link expired",
                serde_json::json!({ "verificationSentAt": request.verification_sent_at }),
                context,
            )
            .await;
            return Err(DataRequestError::TokenExpired);
        }

        let verified = RequestUpdate {
            verified_at: Some(now),
            ..RequestUpdate::default()
        };
        if !self
            .transition(&request, RequestStatus::Pending, RequestStatus::Verified, verified)
            .await?
        {
            return self.already_processed(request.id).await;
        }
        self.record_transition(
            &request,
            AuditAction::GdprRequestVerified,
            "Data request verified by the requester",
            serde_json::json!({ "verifiedAt": now }),
            context,
        )
        .await;

        let outcome = match self.dispatch(&request, context).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("Data request processing failed: {:?}", err);
                self.transition(
                    &request,
                    RequestStatus::Verified,
                    RequestStatus::Pending,
                    RequestUpdate::default(),
                )
                .await?;
                self.record_transition(
                    &request,
                    AuditAction::GdprRequestFailed,
                    "Data request processing failed, request is retryable",
                    serde_json::json!({ "error": err.to_string() }),
                    context,
                )
                .await;
                return Err(DataRequestError::Processing(err));
            }
        };

        let processed_at = self.clock.utc();
        let mut update = outcome.update;
        update.processed_at = Some(processed_at);
        if self
            .transition(&request, RequestStatus::Verified, RequestStatus::Completed, update)
            .await?
        {
            self.record_transition(
                &request,
                AuditAction::GdprRequestCompleted,
                format!("{} request completed", request.request_type.as_ref()),
                serde_json::json!({ "processedAt": processed_at }),
                context,
            )
            .await;
        }
        self.tokens.consume(&token.token).await?;

        Ok(VerifyRequestOutcome::Processed {
            request_type: request.request_type,
            data: outcome.data,
        })
    }

    pub async fn status(&self, id: Uuid) -> Result<DataRequestStatusView, DataRequestError> {
        self.repositories
            .data_requests
            .find_by_id(id)
            .await?
            .map(|request| request.status_view())
            .ok_or(DataRequestError::NotFound)
    }

    pub async fn list(&self, limit: i64) -> RepositoryResult<Vec<DataRequest>> {
        self.repositories.data_requests.list(limit).await
    }

    pub async fn count_open(&self) -> RepositoryResult<i64> {
        self.repositories.data_requests.count_open().await
    }

    async fn transition(
        &self,
        request: &DataRequest,
        from: RequestStatus,
        to: RequestStatus,
        update: RequestUpdate,
    ) -> RepositoryResult<bool> {
        debug_assert!(from.can_transition_to(to));
        let moved = self
            .repositories
            .data_requests
            .transition(request.id, from, to, update)
            .await?;
        if moved {
            tracing::info!(
                data_request_id = %request.id,
                from = %from.as_ref(),
                to = %to.as_ref(),
                "Data request transitioned"
            );
        }

        Ok(moved)
    }

    async fn already_processed(&self, id: Uuid) -> Result<VerifyRequestOutcome, DataRequestError> {
        let status = self
            .repositories
            .data_requests
            .find_by_id(id)
            .await?
            .map(|request| request.status)
            .ok_or(DataRequestError::NotFound)?;

        Ok(VerifyRequestOutcome::AlreadyProcessed { status })
    }

    /// Lifecycle entries carry no subscriber id so they survive an erasure.
    async fn record_transition(
        &self,
        request: &DataRequest,
        action: AuditAction,
        description: impl Into<String>,
        details: serde_json::Value,
        context: &AuditContext,
    ) {
        let mut new_data = serde_json::json!({
            "dataRequestId": request.id,
            "requestType": request.request_type,
            "emailHash": request.email_hash.as_ref(),
        });
        if let (Some(target), serde_json::Value::Object(details)) =
            (new_data.as_object_mut(), details)
        {
            target.extend(details);
        }

        self.audit
            .record(
                NewAuditEntry::new(action, description)
                    .legal_basis(LegalBasis::LegalObligation)
                    .new_data(new_data),
                context,
            )
            .await;
    }

    async fn dispatch(
        &self,
        request: &DataRequest,
        context: &AuditContext,
    ) -> Result<ProcessorOutcome, ProcessorError> {
        match request.request_type {
            RequestType::Export => {
                self.exports
                    .process(request, ExportFormat::Standard, context)
                    .await
            }
            RequestType::Portability => {
                self.exports
                    .process(request, ExportFormat::Portable, context)
                    .await
            }
            RequestType::Delete => self.deletions.process(request, context).await,
            RequestType::Rectify => self.rectify(request, context).await,
            RequestType::Restrict => self.restrict(request, context).await,
        }
    }

    async fn rectify(
        &self,
        request: &DataRequest,
        context: &AuditContext,
    ) -> Result<ProcessorOutcome, ProcessorError> {
        let subscriber = self
            .repositories
            .subscribers
            .find_by_email_hash(&request.email_hash)
            .await?;

        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::DataRectificationRequested,
                    "Data rectification queued for manual review",
                )
                .subscriber(subscriber.map(|subscriber| subscriber.id))
                .legal_basis(LegalBasis::LegalObligation)
                .new_data(serde_json::json!({ "dataRequestId": request.id })),
                context,
            )
            .await;

        Ok(ProcessorOutcome {
            update: RequestUpdate {
                notes: Some(RECTIFICATION_NOTE.to_string()),
                ..RequestUpdate::default()
            },
            data: serde_json::json!({
                "message": "Data rectification request received. Our team will review and contact you within 30 days.",
                "requiresManualReview": true,
            }),
        })
    }

    async fn restrict(
        &self,
        request: &DataRequest,
        context: &AuditContext,
    ) -> Result<ProcessorOutcome, ProcessorError> {
        let subscriber = self
            .repositories
            .subscribers
            .find_by_email_hash(&request.email_hash)
            .await?;

        if let Some(subscriber) = &subscriber {
            self.repositories
                .subscribers
                .restrict(subscriber.id, self.clock.utc())
                .await?;
        }
        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::ProcessingRestricted,
                    "Processing of personal data restricted",
                )
                .subscriber(subscriber.as_ref().map(|subscriber| subscriber.id))
                .legal_basis(LegalBasis::LegalObligation)
                .new_data(serde_json::json!({
                    "dataRequestId": request.id,
                    "subscriberFound": subscriber.is_some(),
                    "isActive": false,
                })),
                context,
            )
            .await;

        Ok(ProcessorOutcome {
            update: RequestUpdate::default(),
            data: serde_json::json!({
                "message": "Processing restriction applied. Your data will not be used for marketing purposes.",
                "restricted": true,
            }),
        })
    }
}

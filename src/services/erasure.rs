use std::sync::Arc;

use crate::domain::audit::{AuditAction, AuditContext, NewAuditEntry};
use crate::domain::consent::LegalBasis;
use crate::domain::data_request::{DataRequest, RequestUpdate};
use crate::repository::{ErasureRepository, ErasureTarget, SubscriberRepository};
use crate::services::data_requests::{ProcessorError, ProcessorOutcome};
use crate::services::{AuditLogger, ExportStore};

/// Right to erasure. Hard-deletes the subject, including export artifacts of
/// earlier requests, and leaves a counts-only audit entry behind as proof.
#[derive(Clone)]
pub struct DeletionProcessor {
    subscribers: Arc<dyn SubscriberRepository>,
    erasure: Arc<dyn ErasureRepository>,
    exports: ExportStore,
    audit: AuditLogger,
}

impl DeletionProcessor {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        erasure: Arc<dyn ErasureRepository>,
        exports: ExportStore,
        audit: AuditLogger,
    ) -> Self {
        DeletionProcessor {
            subscribers,
            erasure,
            exports,
            audit,
        }
    }

    #[tracing::instrument(
        name = "Erase a data subject",
        skip(self, request, context),
        fields(data_request_id = %request.id)
    )]
    pub async fn process(
        &self,
        request: &DataRequest,
        context: &AuditContext,
    ) -> Result<ProcessorOutcome, ProcessorError> {
        let email = request
            .request_email
            .clone()
            .ok_or(ProcessorError::Redacted)?;
        let subscriber = self
            .subscribers
            .find_by_email_hash(&request.email_hash)
            .await?;

        // Attributed to the subscriber, so the erasure below removes it again.
        if let Some(subscriber) = &subscriber {
            self.audit
                .record(
                    NewAuditEntry::new(
                        AuditAction::DataDeletionInitiated,
                        "Erasure of personal data started",
                    )
                    .subscriber(Some(subscriber.id))
                    .legal_basis(LegalBasis::LegalObligation)
                    .old_data(subscriber.audit_snapshot()),
                    context,
                )
                .await;
        }

        let erased = self
            .erasure
            .erase_subject(&ErasureTarget {
                request_id: request.id,
                subscriber_id: subscriber.as_ref().map(|subscriber| subscriber.id),
                email,
                email_hash: request.email_hash.clone(),
            })
            .await?;
        let mut counts = erased.counts;

        // The rows are gone at this point; a file that cannot be removed is
        // left for the expired export sweep.
        for export_id in erased.export_ids {
            match self.exports.remove(export_id).await {
                Ok(true) => counts.export_files += 1,
                Ok(false) => {}
                Err(err) => tracing::error!(%export_id, "Export artifact not deleted: {:?}", err),
            }
        }
        tracing::info!(?counts, "Data subject erased");

        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::DataDeletionCompleted,
                    "Personal data permanently deleted",
                )
                .legal_basis(LegalBasis::LegalObligation)
                .new_data(serde_json::json!({
                    "dataRequestId": request.id,
                    "emailHash": request.email_hash.as_ref(),
                    "subscriberFound": subscriber.is_some(),
                    "deleted": counts,
                })),
                context,
            )
            .await;

        Ok(ProcessorOutcome {
            update: RequestUpdate::default(),
            data: serde_json::json!({
                "message": "Your personal data has been permanently deleted.",
                "deletedRecords": counts,
            }),
        })
    }
}

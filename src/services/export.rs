use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::audit::{AuditAction, AuditContext, AuditEntry, NewAuditEntry};
use crate::domain::consent::{ConsentRecord, LegalBasis};
use crate::domain::data_request::{DataRequest, RequestUpdate};
use crate::domain::request_status::RequestStatus;
use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::repository::{RepositoryError, Repositories};
use crate::services::data_requests::{ProcessorError, ProcessorOutcome};
use crate::services::{AuditLogger, Notifier, SharedClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Standard,
    Portable,
}

/// Everything held about one data subject, as handed back to them.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub requested_at: DateTime<Utc>,
    pub request_email: String,
    pub data_found: bool,
    pub format: ExportFormat,
    pub subscriber: Option<Subscriber>,
    pub audit_logs: Vec<AuditEntry>,
    pub consent_records: Vec<ConsentRecord>,
}

/// Export artifacts on the local filesystem, one `<export_id>.json` each.
#[derive(Debug, Clone)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: PathBuf) -> Self {
        ExportStore { root }
    }

    fn path_for(&self, export_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", export_id))
    }

    pub async fn write(
        &self,
        export_id: Uuid,
        document: &ExportDocument,
    ) -> Result<(), ProcessorError> {
        let body = serde_json::to_vec_pretty(document)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(export_id), body).await?;

        Ok(())
    }

    /// `None` when the artifact is gone.
    pub async fn read(&self, export_id: Uuid) -> Result<Option<Vec<u8>>, std::io::Error> {
        match tokio::fs::read(self.path_for(export_id)).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Deletes the artifact. Returns `false` if it was already gone.
    pub async fn remove(&self, export_id: Uuid) -> Result<bool, std::io::Error> {
        match tokio::fs::remove_file(self.path_for(export_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug)]
pub struct ExportDownload {
    pub filename: String,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Export not found")]
    NotFound,
    #[error("Export link has expired")]
    Expired,
    #[error("Failed to look up the export")]
    Repository(#[from] RepositoryError),
    #[error("Failed to read the export artifact")]
    Io(#[from] std::io::Error),
}

/// Builds access and portability exports and serves them back while the
/// link is valid.
#[derive(Clone)]
pub struct ExportProcessor {
    repositories: Repositories,
    store: ExportStore,
    audit: AuditLogger,
    notifier: Notifier,
    clock: SharedClock,
    link_window: Duration,
}

impl ExportProcessor {
    pub fn new(
        repositories: Repositories,
        store: ExportStore,
        audit: AuditLogger,
        notifier: Notifier,
        clock: SharedClock,
        link_window: Duration,
    ) -> Self {
        ExportProcessor {
            repositories,
            store,
            audit,
            notifier,
            clock,
            link_window,
        }
    }

    #[tracing::instrument(
        name = "Build a data export",
        skip(self, request, context),
        fields(data_request_id = %request.id)
    )]
    pub async fn process(
        &self,
        request: &DataRequest,
        format: ExportFormat,
        context: &AuditContext,
    ) -> Result<ProcessorOutcome, ProcessorError> {
        let email = request
            .request_email
            .clone()
            .ok_or(ProcessorError::Redacted)?;

        let subscriber = self
            .repositories
            .subscribers
            .find_by_email_hash(&request.email_hash)
            .await?;
        let audit_logs = match &subscriber {
            Some(subscriber) => self.audit.for_subscriber(subscriber.id).await?,
            None => Vec::new(),
        };
        let consent_records = self.repositories.consents.find_by_email(&email).await?;
        let data_found = subscriber.is_some() || !consent_records.is_empty();

        let document = ExportDocument {
            requested_at: request.created_at,
            request_email: email.clone(),
            data_found,
            format,
            subscriber,
            audit_logs,
            consent_records,
        };
        let export_id = Uuid::new_v4();
        self.store.write(export_id, &document).await?;

        let expires_at = self.clock.utc() + self.link_window;
        let export_url = format!("/gdpr/download-export/{}", export_id);

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::DataExportCreated, "Personal data export created")
                    .legal_basis(LegalBasis::LegalObligation)
                    .new_data(serde_json::json!({
                        "dataRequestId": request.id,
                        "emailHash": request.email_hash.as_ref(),
                        "exportId": export_id,
                        "format": format,
                        "expiresAt": expires_at,
                        "dataFound": data_found,
                    })),
                context,
            )
            .await;

        match SubscriberEmail::parse(email) {
            Ok(recipient) => {
                self.notifier
                    .send_export_ready(&recipient, &export_url, expires_at)
                    .await
            }
            Err(err) => tracing::warn!("Export ready email not sent: {}", err),
        }

        let message = match format {
            ExportFormat::Standard => "Data export completed. Download link sent to your email.",
            ExportFormat::Portable => {
                "Data portability export completed. Your data is provided in a structured, machine-readable format."
            }
        };

        Ok(ProcessorOutcome {
            update: RequestUpdate {
                export_id: Some(export_id),
                export_url: Some(export_url),
                export_expires_at: Some(expires_at),
                ..RequestUpdate::default()
            },
            data: serde_json::json!({
                "message": message,
                "exportId": export_id,
                "expiresAt": expires_at,
                "dataFound": data_found,
            }),
        })
    }

    #[tracing::instrument(name = "Download a data export", skip(self, context))]
    pub async fn download(
        &self,
        export_id: Uuid,
        context: &AuditContext,
    ) -> Result<ExportDownload, DownloadError> {
        let request = self
            .repositories
            .data_requests
            .find_by_export_id(export_id)
            .await?
            .filter(|request| request.status == RequestStatus::Completed)
            .ok_or(DownloadError::NotFound)?;
        let expires_at = request.export_expires_at.ok_or(DownloadError::NotFound)?;

        if self.clock.utc() >= expires_at {
            return Err(DownloadError::Expired);
        }

        let body = self
            .store
            .read(export_id)
            .await?
            .ok_or(DownloadError::NotFound)?;

        self.audit
            .record(
                NewAuditEntry::new(
                    AuditAction::DataExportDownloaded,
                    "Personal data export downloaded",
                )
                .new_data(serde_json::json!({
                    "dataRequestId": request.id,
                    "exportId": export_id,
                })),
                context,
            )
            .await;

        Ok(ExportDownload {
            filename: format!("my-data-export-{}.json", export_id),
            body,
        })
    }
}

impl ExportProcessor {
    /// Deletes artifacts whose download window has closed. Returns how many
    /// files were removed.
    #[tracing::instrument(name = "Sweep expired data exports", skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64, DownloadError> {
        let expired = self
            .repositories
            .data_requests
            .expired_exports(self.clock.utc())
            .await?;
        let mut removed = 0;

        for export_id in expired {
            if self.store.remove(export_id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Expired export artifacts deleted");
        }

        Ok(removed)
    }
}

//! Application services. Each one owns a slice of the workflow and talks to
//! storage only through the repository ports.

pub mod admin_auth;
pub mod audit_logger;
pub mod consent_ledger;
pub mod data_requests;
pub mod erasure;
pub mod export;
pub mod notifier;
pub mod retention;
pub mod subscriptions;
pub mod token_issuer;

use std::sync::Arc;

use mockable::Clock;

use crate::config::Settings;
use crate::email_client::Mailer;
use crate::repository::Repositories;

pub use admin_auth::AdminAuth;
pub use audit_logger::{AuditLogger, AuditOutcome};
pub use consent_ledger::ConsentLedger;
pub use data_requests::DataRequestService;
pub use erasure::DeletionProcessor;
pub use export::{ExportProcessor, ExportStore};
pub use notifier::Notifier;
pub use subscriptions::SubscriptionService;
pub use token_issuer::{TokenIssuer, TokenPolicy};

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Every service the HTTP layer needs, wired over one set of repositories.
#[derive(Clone)]
pub struct Services {
    pub repositories: Repositories,
    pub audit: AuditLogger,
    pub consents: ConsentLedger,
    pub subscriptions: SubscriptionService,
    pub data_requests: DataRequestService,
    pub exports: ExportProcessor,
    pub admin_auth: AdminAuth,
    pub clock: SharedClock,
}

impl Services {
    pub fn build(
        config: &Settings,
        repositories: Repositories,
        mailer: Arc<dyn Mailer>,
        clock: SharedClock,
    ) -> Services {
        let audit = AuditLogger::new(
            repositories.audit.clone(),
            repositories.subscribers.clone(),
            clock.clone(),
            config.compliance.audit_retention_days,
        );
        let tokens = TokenIssuer::new(
            repositories.tokens.clone(),
            clock.clone(),
            TokenPolicy::from(&config.tokens),
        );
        let notifier = Notifier::new(mailer, config.get_app_base_url());
        let consents = ConsentLedger::new(
            repositories.consents.clone(),
            audit.clone(),
            clock.clone(),
            config.compliance.consent_version.clone(),
        );
        let subscriptions = SubscriptionService::new(
            repositories.subscribers.clone(),
            tokens.clone(),
            consents.clone(),
            audit.clone(),
            notifier.clone(),
            clock.clone(),
        );
        let export_store = ExportStore::new(config.compliance.get_export_storage_path());
        let exports = ExportProcessor::new(
            repositories.clone(),
            export_store.clone(),
            audit.clone(),
            notifier.clone(),
            clock.clone(),
            tokens.policy().export_link,
        );
        let deletions = DeletionProcessor::new(
            repositories.subscribers.clone(),
            repositories.erasure.clone(),
            export_store,
            audit.clone(),
        );
        let data_requests = DataRequestService::new(
            repositories.clone(),
            tokens,
            audit.clone(),
            notifier,
            exports.clone(),
            deletions,
            clock.clone(),
        );
        let admin_auth = AdminAuth::new(
            repositories.admins.clone(),
            audit.clone(),
            clock.clone(),
            &config.admin,
        );

        Services {
            repositories,
            audit,
            consents,
            subscriptions,
            data_requests,
            exports,
            admin_auth,
            clock,
        }
    }
}

use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings};
use crate::email_client::EmailClient;
use crate::repository::in_memory::InMemoryStore;
use crate::repository::Repositories;
use crate::routes::{
    audit_logs, cleanup_audit_logs, dashboard, download_export, export, gdpr_requests,
    health_check, json_error_handler, login, query_error_handler, record_consent, request_data,
    request_status, resend_verification, subscribe, subscribers, unsubscribe, verify_email,
    verify_request,
};
use crate::services::retention::spawn_retention_task;
use crate::services::{Services, SharedClock};

pub struct Application {
    pub port: u16,
    pub server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let repositories = if config.use_in_memory_storage() {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            Repositories::in_memory(Arc::new(InMemoryStore::new()))
        } else {
            Repositories::postgres(get_connection_db_pool(&config.database))
        };

        Application::build_with(config, repositories, Arc::new(mockable::DefaultClock)).await
    }

    /// Builds the server over the given storage and clock.
    pub async fn build_with(
        config: Settings,
        repositories: Repositories,
        clock: SharedClock,
    ) -> Result<Self, std::io::Error> {
        let sender_email = config
            .get_email_client_sender()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let email_client = EmailClient::new(
            config.get_email_client_base_url(),
            sender_email,
            config.get_email_client_api(),
            Some(config.get_email_client_timeout()),
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let services = Services::build(&config, repositories, Arc::new(email_client), clock);
        spawn_retention_task(
            services.audit.clone(),
            services.exports.clone(),
            config.compliance.get_retention_interval(),
        );

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        tracing::info!("Server listening on {}:{}", config.application.host, port);
        let server = run(listener, services)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(listener: TcpListener, services: Services) -> Result<Server, std::io::Error> {
    let services = web::Data::new(services);

    let server = HttpServer::new(move || {
        App::new()
            // 'wrap' method adds a middleware to the App. This one logs every request and
            // assigns it the id echoed back in response bodies
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .route("/health_check", web::get().to(health_check))
            .route("/consent", web::post().to(record_consent))
            .service(
                web::scope("/email")
                    .route("/subscribe", web::post().to(subscribe))
                    .route("/resend-verification", web::post().to(resend_verification))
                    .route("/verify/{token}", web::get().to(verify_email))
                    .route("/unsubscribe/{token}", web::get().to(unsubscribe)),
            )
            .service(
                web::scope("/gdpr")
                    .route("/request-data", web::post().to(request_data))
                    .route("/verify-request/{token}", web::get().to(verify_request))
                    .route("/download-export/{export_id}", web::get().to(download_export))
                    .route("/request-status/{request_id}", web::get().to(request_status)),
            )
            .service(
                web::scope("/admin")
                    .route("/login", web::post().to(login))
                    .route("/dashboard", web::get().to(dashboard))
                    .route("/subscribers", web::get().to(subscribers))
                    .route("/gdpr-requests", web::get().to(gdpr_requests))
                    .route("/audit-logs", web::get().to(audit_logs))
                    .route("/audit-logs/cleanup", web::post().to(cleanup_audit_logs))
                    .route("/export/{export_type}", web::get().to(export)),
            )
            .app_data(services.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}


use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::domain::consent::CookieConsent;
use crate::repository::RepositoryError;
use crate::routes::error::{ApiError, RequestError, Tagged};
use crate::routes::ClientContext;
use crate::services::Services;

const DEFAULT_SOURCE: &str = "cookie_banner";

#[derive(Deserialize, Debug)]
pub struct ConsentBody {
    pub consent: CookieConsent,
    pub source: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConsentError {
    #[error("Internal server error while recording consent")]
    Storage(#[from] RepositoryError),
}

impl ApiError for ConsentError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[tracing::instrument(
    name = "Record cookie consent handler",
    skip(body, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn record_consent(
    body: web::Json<ConsentBody>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<ConsentError>> {
    let body = body.into_inner();
    let source = body
        .source
        .as_deref()
        .map(str::trim)
        .filter(|source| !source.is_empty())
        .unwrap_or(DEFAULT_SOURCE);

    let record = services
        .consents
        .record_cookie_consent(body.consent, source, &context.audit_context())
        .await
        .map_err(ConsentError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "message": "Consent preferences recorded successfully",
            "consentId": record.id,
        }),
    ))
}

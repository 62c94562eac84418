use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::data_request::RequestType;
use crate::routes::error::{ApiError, RequestError, Tagged};
use crate::routes::ClientContext;
use crate::services::data_requests::{DataRequestError, VerifyRequestOutcome};
use crate::services::export::DownloadError;
use crate::services::Services;

impl ApiError for DataRequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            DataRequestError::Validation(_) | DataRequestError::TokenExpired => {
                StatusCode::BAD_REQUEST
            }
            DataRequestError::NotFound => StatusCode::NOT_FOUND,
            DataRequestError::Processing(_) | DataRequestError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            DataRequestError::Validation(_) => Some("VALIDATION_FAILED"),
            DataRequestError::TokenExpired => Some("TOKEN_EXPIRED"),
            _ => None,
        }
    }
}

impl ApiError for DownloadError {
    fn status_code(&self) -> StatusCode {
        match self {
            DownloadError::NotFound => StatusCode::NOT_FOUND,
            DownloadError::Expired => StatusCode::GONE,
            DownloadError::Repository(_) | DownloadError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DataRequestBody {
    pub email: String,
    pub request_type: String,
}

#[tracing::instrument(
    name = "Submit data request handler",
    skip(body, services, context),
    fields(request_id = %context.request_id, request_type = %body.request_type)
)]
pub async fn request_data(
    body: web::Json<DataRequestBody>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<DataRequestError>> {
    let body = body.into_inner();
    let request_type = RequestType::parse(body.request_type)
        .map_err(DataRequestError::Validation)
        .tagged(&context.request_id)?;

    let request = services
        .data_requests
        .submit(body.email, request_type, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "message": "Data request submitted. Please check your email to verify your identity.",
            "dataRequestId": request.id,
            "estimatedProcessingTime": "30 days",
        }),
    ))
}

#[tracing::instrument(
    name = "Verify data request handler",
    skip(token, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn verify_request(
    token: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<DataRequestError>> {
    let outcome = services
        .data_requests
        .verify(&token, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    let body = match outcome {
        VerifyRequestOutcome::Processed { request_type, data } => serde_json::json!({
            "message": format!(
                "Your {} request has been verified and processed.",
                request_type.as_ref().to_lowercase()
            ),
            "status": "PROCESSED",
            "requestType": request_type,
            "data": data,
        }),
        VerifyRequestOutcome::AlreadyProcessed { status } => serde_json::json!({
            "message": "Request already processed",
            "status": status,
        }),
    };

    Ok(context.respond(StatusCode::OK, body))
}

#[tracing::instrument(
    name = "Download data export handler",
    skip(services, context),
    fields(request_id = %context.request_id)
)]
pub async fn download_export(
    export_id: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<DownloadError>> {
    // Ids that are not UUIDs cannot name an export.
    let export_id = Uuid::parse_str(&export_id)
        .map_err(|_| DownloadError::NotFound)
        .tagged(&context.request_id)?;

    let download = services
        .exports
        .download(export_id, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(download.filename)],
        })
        .body(download.body))
}

#[tracing::instrument(
    name = "Data request status handler",
    skip(services, context),
    fields(request_id = %context.request_id)
)]
pub async fn request_status(
    request_id: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<DataRequestError>> {
    let id = Uuid::parse_str(&request_id)
        .map_err(|_| DataRequestError::NotFound)
        .tagged(&context.request_id)?;

    let request = services
        .data_requests
        .status(id)
        .await
        .tagged(&context.request_id)?;

    Ok(context.respond(StatusCode::OK, serde_json::json!({ "request": request })))
}

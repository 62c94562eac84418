use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use crate::routes::ClientContext;

/// HTTP meaning of a route module's error enum.
pub trait ApiError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    /// Machine readable code for errors the client is expected to branch on.
    fn code(&self) -> Option<&'static str> {
        None
    }
}

/// A route error tagged with the correlation id of the request that failed.
pub struct RequestError<E> {
    request_id: String,
    error: E,
}

impl<E> RequestError<E> {
    pub fn new(request_id: &str, error: E) -> Self {
        RequestError {
            request_id: request_id.to_string(),
            error,
        }
    }
}

impl<E: std::error::Error> std::fmt::Debug for RequestError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(&self.error, f)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RequestError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl<E: ApiError> ResponseError for RequestError<E> {
    fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            "An unexpected error occurred".to_string()
        } else {
            self.error.to_string()
        };
        let mut body = serde_json::json!({
            "error": message,
            "requestId": self.request_id,
        });
        if let Some(code) = self.error.code() {
            body["code"] = code.into();
        }

        HttpResponse::build(status).json(body)
    }
}

pub trait Tagged<T, E> {
    fn tagged(self, request_id: &str) -> Result<T, RequestError<E>>;
}

impl<T, E> Tagged<T, E> for Result<T, E> {
    fn tagged(self, request_id: &str) -> Result<T, RequestError<E>> {
        self.map_err(|error| RequestError::new(request_id, error))
    }
}

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Validation failed: {0}")]
    Json(String),
    #[error("Validation failed: {0}")]
    Query(String),
}

impl ApiError for PayloadError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn code(&self) -> Option<&'static str> {
        Some("VALIDATION_FAILED")
    }
}

/// Malformed JSON bodies get the same error shape as every other failure.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    req: &HttpRequest,
) -> actix_web::Error {
    let context = ClientContext::from_http_request(req);

    RequestError::new(&context.request_id, PayloadError::Json(err.to_string())).into()
}

pub fn query_error_handler(
    err: actix_web::error::QueryPayloadError,
    req: &HttpRequest,
) -> actix_web::Error {
    let context = ClientContext::from_http_request(req);

    RequestError::new(&context.request_id, PayloadError::Query(err.to_string())).into()
}

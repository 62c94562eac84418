use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::USER_AGENT;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpMessage, HttpRequest, HttpResponse};
use tracing_actix_web::RequestId;
use uuid::Uuid;

use crate::domain::audit::AuditContext;

/// Caller details every handler needs for auditing and error correlation.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: String,
}

impl ClientContext {
    pub fn from_http_request(req: &HttpRequest) -> ClientContext {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|request_id| request_id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string);
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        ClientContext {
            ip,
            user_agent,
            request_id,
        }
    }

    pub fn audit_context(&self) -> AuditContext {
        AuditContext {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            request_id: Some(self.request_id.clone()),
        }
    }

    /// JSON response with the correlation id added to the body.
    pub fn respond(&self, status: StatusCode, mut body: serde_json::Value) -> HttpResponse {
        if let Some(object) = body.as_object_mut() {
            object.insert("requestId".to_string(), self.request_id.clone().into());
        }

        HttpResponse::build(status).json(body)
    }
}

impl FromRequest for ClientContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientContext::from_http_request(req)))
    }
}

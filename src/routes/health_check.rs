use actix_web::http::StatusCode;
use actix_web::Responder;

use crate::routes::ClientContext;

/// Endpoint used by clients to know if the server is working
#[tracing::instrument(name = "Health Check handler", skip(context))]
pub async fn health_check(context: ClientContext) -> impl Responder {
    context.respond(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

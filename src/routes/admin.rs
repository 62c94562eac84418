use actix_web::http::header::{
    ContentDisposition, DispositionParam, DispositionType, AUTHORIZATION,
};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Duration;
use secrecy::Secret;
use serde::Deserialize;

use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::consent::LegalBasis;
use crate::domain::subscriber::SubscriberFilter;
use crate::repository::RepositoryError;
use crate::routes::error::{ApiError, RequestError, Tagged};
use crate::routes::ClientContext;
use crate::services::admin_auth::{AdminAuthError, AdminProfile};
use crate::services::audit_logger::{AuditSearch, AuditSearchError};
use crate::services::Services;

const DASHBOARD_WINDOW_DAYS: i64 = 30;
const RECENT_ACTIVITY: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const EXPORT_LIMIT: i64 = 10_000;

#[derive(thiserror::Error, Debug)]
pub enum AdminError {
    #[error(transparent)]
    Auth(#[from] AdminAuthError),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid export type")]
    InvalidExportType,
    #[error("Failed to load admin data")]
    Repository(#[from] RepositoryError),
    #[error("Failed to serialize export")]
    Serialization(#[from] serde_json::Error),
}

impl From<AuditSearchError> for AdminError {
    fn from(err: AuditSearchError) -> Self {
        match err {
            AuditSearchError::UnknownAction(message) => AdminError::Validation(message),
            AuditSearchError::PageOutOfRange => {
                AdminError::Validation("Page is out of range".to_string())
            }
            AuditSearchError::Repository(err) => AdminError::Repository(err),
        }
    }
}

impl ApiError for AdminError {
    fn status_code(&self) -> StatusCode {
        match self {
            AdminError::Auth(err) => match err {
                AdminAuthError::InvalidCredentials
                | AdminAuthError::MissingToken
                | AdminAuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AdminAuthError::Locked(_) => StatusCode::LOCKED,
                AdminAuthError::Forbidden => StatusCode::FORBIDDEN,
                AdminAuthError::Repository(_) | AdminAuthError::Unexpected(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AdminError::Validation(_) | AdminError::InvalidExportType => StatusCode::BAD_REQUEST,
            AdminError::Repository(_) | AdminError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            AdminError::Auth(AdminAuthError::Locked(_)) => Some("ACCOUNT_LOCKED"),
            AdminError::Validation(_) => Some("VALIDATION_FAILED"),
            _ => None,
        }
    }
}

type AdminResult = Result<HttpResponse, RequestError<AdminError>>;

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn authorize(
    req: &HttpRequest,
    services: &Services,
    context: &ClientContext,
) -> Result<AdminProfile, RequestError<AdminError>> {
    services
        .admin_auth
        .authenticate(bearer_token(req), &context.audit_context())
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)
}

/// `(page, limit, offset)` from optional query values, rejecting out-of-range input.
fn pagination(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: i64,
) -> Result<(i64, i64, i64), AdminError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(default_limit);
    if page < 1 {
        return Err(AdminError::Validation(
            "Page must be a positive integer".to_string(),
        ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AdminError::Validation(format!(
            "Limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AdminError::Validation("Page is out of range".to_string()))?;

    Ok((page, limit, offset))
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: Secret<String>,
}

#[tracing::instrument(
    name = "Admin login handler",
    skip(body, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn login(
    body: web::Json<LoginBody>,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    let body = body.into_inner();
    let session = services
        .admin_auth
        .login(&body.email, body.password, &context.audit_context())
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "message": "Login successful",
            "token": session.token,
            "admin": session.admin,
        }),
    ))
}

#[tracing::instrument(name = "Admin dashboard handler", skip_all)]
pub async fn dashboard(
    req: HttpRequest,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    authorize(&req, &services, &context).await?;

    let window = Duration::days(DASHBOARD_WINDOW_DAYS);
    let load = async {
        let subscribers = services
            .repositories
            .subscribers
            .stats(services.clock.utc() - window)
            .await?;
        let pending_requests = services.data_requests.count_open().await?;
        let audit = services.audit.stats(window).await?;
        let recent = services.audit.recent(RECENT_ACTIVITY).await?;

        Ok::<_, RepositoryError>(serde_json::json!({
            "subscribers": subscribers,
            "gdpr": { "pendingRequests": pending_requests },
            "audit": audit,
            "recentActivity": recent
                .iter()
                .map(|entry| serde_json::json!({
                    "id": entry.id,
                    "action": entry.action,
                    "description": entry.description,
                    "createdAt": entry.created_at,
                    "subscriberId": entry.subscriber_id,
                }))
                .collect::<Vec<_>>(),
        }))
    };
    let dashboard = load
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(StatusCode::OK, serde_json::json!({ "dashboard": dashboard })))
}

#[derive(Deserialize, Debug)]
pub struct SubscribersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<SubscriberFilter>,
}

#[tracing::instrument(name = "Admin subscribers handler", skip_all)]
pub async fn subscribers(
    req: HttpRequest,
    query: web::Query<SubscribersQuery>,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    authorize(&req, &services, &context).await?;
    let (page, limit, offset) =
        pagination(query.page, query.limit, 20).tagged(&context.request_id)?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty());

    let (subscribers, total) = services
        .repositories
        .subscribers
        .list(
            query.status.unwrap_or_default(),
            search,
            limit,
            offset,
        )
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "subscribers": subscribers,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": total,
                "pages": (total + limit - 1) / limit,
            },
        }),
    ))
}

#[tracing::instrument(name = "Admin data requests handler", skip_all)]
pub async fn gdpr_requests(
    req: HttpRequest,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    authorize(&req, &services, &context).await?;

    let requests = services
        .data_requests
        .list(EXPORT_LIMIT)
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(StatusCode::OK, serde_json::json!({ "requests": requests })))
}

#[tracing::instrument(name = "Admin audit search handler", skip_all)]
pub async fn audit_logs(
    req: HttpRequest,
    query: web::Query<AuditSearch>,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    authorize(&req, &services, &context).await?;
    let mut search = query.into_inner();
    let (page, limit, _) =
        pagination(search.page, search.limit, 50).tagged(&context.request_id)?;
    search.page = Some(page);
    search.limit = Some(limit);

    let result = services
        .audit
        .search(&search)
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "logs": result.entries,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": result.total,
                "hasMore": result.has_more,
            },
        }),
    ))
}

#[tracing::instrument(name = "Admin export handler", skip(req, services, context))]
pub async fn export(
    req: HttpRequest,
    export_type: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    let admin = authorize(&req, &services, &context).await?;
    let export_type = export_type.into_inner();

    let load = async {
        let data = match export_type.as_str() {
            "subscribers" => {
                let (subscribers, _) = services
                    .repositories
                    .subscribers
                    .list(SubscriberFilter::All, None, EXPORT_LIMIT, 0)
                    .await?;
                serde_json::to_value(subscribers)
            }
            "audit-logs" => serde_json::to_value(services.audit.recent(EXPORT_LIMIT).await?),
            "gdpr-requests" => serde_json::to_value(services.data_requests.list(EXPORT_LIMIT).await?),
            _ => return Err(AdminError::InvalidExportType),
        };

        Ok::<_, AdminError>(data?)
    };
    let data = load.await.tagged(&context.request_id)?;
    let record_count = data.as_array().map_or(0, Vec::len);
    let exported_at = services.clock.utc();

    services
        .audit
        .record(
            NewAuditEntry::new(
                AuditAction::AdminDataExport,
                format!("Admin exported {} data", export_type),
            )
            .legal_basis(LegalBasis::LegitimateInterests)
            .new_data(serde_json::json!({
                "exportType": export_type,
                "recordCount": record_count,
                "adminId": admin.id,
                "adminEmail": admin.email,
            })),
            &context.audit_context(),
        )
        .await;

    let filename = format!(
        "{}-export-{}.json",
        export_type,
        exported_at.format("%Y-%m-%d")
    );

    Ok(HttpResponse::Ok()
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .json(serde_json::json!({
            "exportMetadata": {
                "type": export_type,
                "exportedAt": exported_at,
                "recordCount": record_count,
                "exportedBy": admin.email,
            },
            "data": data,
            "requestId": context.request_id,
        })))
}

#[tracing::instrument(name = "Admin audit cleanup handler", skip_all)]
pub async fn cleanup_audit_logs(
    req: HttpRequest,
    services: web::Data<Services>,
    context: ClientContext,
) -> AdminResult {
    authorize(&req, &services, &context).await?;

    let deleted = services
        .audit
        .cleanup(&context.audit_context())
        .await
        .map_err(AdminError::from)
        .tagged(&context.request_id)?;

    Ok(context.respond(
        StatusCode::OK,
        serde_json::json!({
            "message": "Audit retention cleanup completed",
            "deletedCount": deleted,
        }),
    ))
}

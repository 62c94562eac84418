use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::domain::new_subscriber::NewSubscriberBody;
use crate::routes::error::{ApiError, RequestError, Tagged};
use crate::routes::ClientContext;
use crate::services::subscriptions::{
    ResendOutcome, SubscribeOutcome, SubscriptionError, UnsubscribeOutcome, VerifyEmailOutcome,
};
use crate::services::Services;

impl ApiError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::ConsentRequired
            | SubscriptionError::Validation(_)
            | SubscriptionError::TokenExpired
            | SubscriptionError::Inactive => StatusCode::BAD_REQUEST,
            SubscriptionError::UnknownToken => StatusCode::NOT_FOUND,
            SubscriptionError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            SubscriptionError::ConsentRequired => Some("CONSENT_REQUIRED"),
            SubscriptionError::Validation(_) => Some("VALIDATION_FAILED"),
            SubscriptionError::TokenExpired => Some("TOKEN_EXPIRED"),
            _ => None,
        }
    }
}

#[tracing::instrument(
    name = "Subscribe handler",
    skip(body, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn subscribe(
    body: web::Json<NewSubscriberBody>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<SubscriptionError>> {
    let outcome = services
        .subscriptions
        .subscribe(&body, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    let response = match outcome {
        SubscribeOutcome::Created { subscriber_id } => context.respond(
            StatusCode::CREATED,
            serde_json::json!({
                "message": "Subscription successful! Please check your email to verify your subscription.",
                "requiresVerification": true,
                "subscriberId": subscriber_id,
            }),
        ),
        SubscribeOutcome::Reactivated { .. } => context.respond(
            StatusCode::OK,
            serde_json::json!({
                "message": "Subscription reactivated. Please check your email to verify.",
                "requiresVerification": true,
            }),
        ),
        SubscribeOutcome::AlreadyPending => context.respond(
            StatusCode::OK,
            serde_json::json!({
                "message": "Please check your email to verify your subscription.",
                "requiresVerification": true,
                "alreadyPending": true,
            }),
        ),
        SubscribeOutcome::AlreadySubscribed => context.respond(
            StatusCode::OK,
            serde_json::json!({
                "message": "You are already subscribed to our newsletter!",
                "alreadySubscribed": true,
            }),
        ),
    };

    Ok(response)
}

#[derive(Deserialize, Debug)]
pub struct ResendBody {
    pub email: String,
}

#[tracing::instrument(
    name = "Resend verification handler",
    skip(body, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn resend_verification(
    body: web::Json<ResendBody>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<SubscriptionError>> {
    let outcome = services
        .subscriptions
        .resend_verification(body.into_inner().email, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    let body = match outcome {
        ResendOutcome::Sent => serde_json::json!({
            "message": "Verification email sent. Please check your inbox.",
        }),
        ResendOutcome::Neutral => serde_json::json!({
            "message": "If this email is in our system, a verification email has been sent.",
        }),
        ResendOutcome::AlreadyVerified => serde_json::json!({
            "message": "This email is already verified.",
            "alreadyVerified": true,
        }),
    };

    Ok(context.respond(StatusCode::OK, body))
}

#[tracing::instrument(
    name = "Verify email handler",
    skip(token, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn verify_email(
    token: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<SubscriptionError>> {
    let outcome = services
        .subscriptions
        .verify_email(&token, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    let body = match outcome {
        VerifyEmailOutcome::Verified => serde_json::json!({
            "message": "Email successfully verified! Welcome to the community.",
            "verified": true,
        }),
        VerifyEmailOutcome::AlreadyVerified => serde_json::json!({
            "message": "Email already verified",
            "alreadyVerified": true,
        }),
    };

    Ok(context.respond(StatusCode::OK, body))
}

#[tracing::instrument(
    name = "Unsubscribe handler",
    skip(token, services, context),
    fields(request_id = %context.request_id)
)]
pub async fn unsubscribe(
    token: web::Path<String>,
    services: web::Data<Services>,
    context: ClientContext,
) -> Result<HttpResponse, RequestError<SubscriptionError>> {
    let outcome = services
        .subscriptions
        .unsubscribe(&token, &context.audit_context())
        .await
        .tagged(&context.request_id)?;

    let body = match outcome {
        UnsubscribeOutcome::Unsubscribed => serde_json::json!({
            "message": "You have been successfully unsubscribed from our newsletter.",
            "unsubscribed": true,
        }),
        UnsubscribeOutcome::AlreadyUnsubscribed => serde_json::json!({
            "message": "You are already unsubscribed",
            "alreadyUnsubscribed": true,
        }),
    };

    Ok(context.respond(StatusCode::OK, body))
}

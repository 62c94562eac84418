use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::data_request::RequestType;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::Mailer;

/// Composes the link-bearing messages sent to subscribers and requesters.
///
/// Delivery failures are logged and swallowed: the workflow that triggered
/// the message has already been committed and the link can be re-requested.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, base_url: String) -> Self {
        Notifier { mailer, base_url }
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/email/verify/{}", self.base_url, token)
    }

    pub fn unsubscribe_link(&self, token: &str) -> String {
        format!("{}/email/unsubscribe/{}", self.base_url, token)
    }

    pub fn data_request_link(&self, token: &str) -> String {
        format!("{}/gdpr/verify-request/{}", self.base_url, token)
    }

    #[tracing::instrument(name = "Send a verification email", skip(self, recipient, token))]
    pub async fn send_verification(&self, recipient: &SubscriberEmail, token: &str) {
        let html_body = format!(
            r#"<div>
    <h1>Please confirm your subscription</h1>
    <p>Click <a href="{}">here</a> to verify your email address. The link expires in 24 hours.</p>
</div>"#,
            self.verification_link(token)
        );

        self.deliver(recipient, "Verify your subscription", &html_body)
            .await
    }

    #[tracing::instrument(name = "Send a welcome email", skip(self, recipient, unsubscribe_token))]
    pub async fn send_welcome(&self, recipient: &SubscriberEmail, unsubscribe_token: &str) {
        let html_body = format!(
            r#"<div>
    <h1>Welcome aboard!</h1>
    <p>Your email address is verified.</p>
    <p>You can <a href="{}">unsubscribe</a> at any time.</p>
</div>"#,
            self.unsubscribe_link(unsubscribe_token)
        );

        self.deliver(recipient, "Welcome to the community", &html_body)
            .await
    }

    #[tracing::instrument(name = "Send a data request verification email", skip(self, recipient, token))]
    pub async fn send_data_request_verification(
        &self,
        recipient: &SubscriberEmail,
        request_type: RequestType,
        token: &str,
    ) {
        let kind = request_type.as_ref().to_lowercase();
        let html_body = format!(
            r#"<div>
    <h1>Confirm your {kind} request</h1>
    <p>We received a {kind} request for this email address.</p>
    <p>Click <a href="{}">here</a> to confirm it. The link expires in 7 days.</p>
    <p>If you did not make this request you can ignore this email.</p>
</div>"#,
            self.data_request_link(token)
        );

        self.deliver(
            recipient,
            &format!("Verify your {} request", kind),
            &html_body,
        )
        .await
    }

    #[tracing::instrument(name = "Send an export ready email", skip(self, recipient))]
    pub async fn send_export_ready(
        &self,
        recipient: &SubscriberEmail,
        export_url: &str,
        expires_at: DateTime<Utc>,
    ) {
        let html_body = format!(
            r#"<div>
    <h1>Your data export is ready</h1>
    <p>Download it <a href="{}{}">here</a>.</p>
    <p>The link is valid until {}.</p>
</div>"#,
            self.base_url,
            export_url,
            expires_at.to_rfc3339()
        );

        self.deliver(recipient, "Your data export is ready", &html_body)
            .await
    }

    async fn deliver(&self, recipient: &SubscriberEmail, subject: &str, html_body: &str) {
        if let Err(err) = self.mailer.send_email(recipient, subject, html_body).await {
            tracing::error!("Failed to send \"{}\" email: {:?}", subject, err);
        }
    }
}

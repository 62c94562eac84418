use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};

use crate::domain::subscriber_email::SubscriberEmail;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAIL_SEND_PATH: &str = "/mail/send";

/// Outbound transactional mail: verification links, welcome notes and
/// data request notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error>;
}

/// SendGrid v3 client. Every message goes to a single recipient.
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    api_key: Secret<String>,
}

#[derive(serde::Serialize)]
struct MailSendBody<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(serde::Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(serde::Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(serde::Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

impl<'a> MailSendBody<'a> {
    fn html(
        sender: &'a SubscriberEmail,
        recipient: &'a SubscriberEmail,
        subject: &'a str,
        html_content: &'a str,
    ) -> Self {
        MailSendBody {
            personalizations: [Personalization {
                to: [Address {
                    email: recipient.as_ref(),
                }],
            }],
            from: Address {
                email: sender.as_ref(),
            },
            subject,
            content: [Content {
                content_type: "text/html",
                value: html_content,
            }],
        }
    }
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        api_key: Secret<String>,
        timeout: Option<Duration>,
    ) -> Result<EmailClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(EmailClient {
            http_client,
            base_url,
            sender,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for EmailClient {
    #[tracing::instrument(name = "Sending an email", skip(self, recipient, html_content))]
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error> {
        let body = MailSendBody::html(&self.sender, recipient, subject, html_content);

        self.http_client
            .post(format!("{}{}", self.base_url, MAIL_SEND_PATH))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

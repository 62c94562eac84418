//! Doubles shared by the unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Utc};
use mockable::Clock;
use uuid::Uuid;

use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::Mailer;
use crate::services::Notifier;

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, delta: Duration) {
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub html: String,
}

impl SentEmail {
    /// First link in the body that starts with `prefix`.
    pub fn link_starting_with(&self, prefix: &str) -> Option<String> {
        self.html
            .split('"')
            .find(|fragment| fragment.starts_with(prefix))
            .map(str::to_string)
    }
}

#[derive(Default)]
pub struct RecordingMailer(Mutex<Vec<SentEmail>>);

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.0.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error> {
        if let Ok(mut sent) = self.0.lock() {
            sent.push(SentEmail {
                recipient: recipient.as_ref().to_string(),
                subject: subject.to_string(),
                html: html_content.to_string(),
            });
        }
        Ok(())
    }
}

pub const BASE_URL: &str = "http://localhost:8000";

pub fn recording_notifier() -> (Notifier, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());

    (Notifier::new(mailer.clone(), BASE_URL.to_string()), mailer)
}

pub fn subscriber_fixture(email: &str, now: DateTime<Utc>) -> Subscriber {
    let email = SubscriberEmail::parse(email.to_string()).unwrap();

    Subscriber {
        id: Uuid::new_v4(),
        email_hash: email.hash(),
        email,
        consent_given: true,
        consent_version: "1.0".to_string(),
        consent_timestamp: now,
        consent_ip: None,
        consent_user_agent: None,
        is_verified: false,
        is_active: true,
        source: "website".to_string(),
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        created_at: now,
        updated_at: now,
        verified_at: None,
        unsubscribed_at: None,
    }
}

use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Duration, Local, Utc};
use mockable::Clock;
use reqwest::{Response, Url};
use secrecy::Secret;
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consent_ledger::config::{get_configuration, Settings};
use consent_ledger::domain::admin::{AdminRole, AdminUser};
use consent_ledger::domain::audit::{AuditAction, AuditEntry};
use consent_ledger::repository::in_memory::InMemoryStore;
use consent_ledger::repository::{AdminRepository, Repositories};
use consent_ledger::services::admin_auth::hash_password;
use consent_ledger::startup::Application;
use consent_ledger::telemetry::{get_subscriber, init_subscriber};

pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

static TRACING: OnceLock<()> = OnceLock::new();

// Set TEST_LOG to see the bunyan output of a test run
fn init_tracing() {
    TRACING.get_or_init(|| {
        let name = String::from("test");
        let filter = String::from("debug");
        if std::env::var("TEST_LOG").is_ok() {
            init_subscriber(get_subscriber(name, filter, std::io::stdout));
        } else {
            init_subscriber(get_subscriber(name, filter, std::io::sink));
        }
    });
}

/// Clock the tests can move forward to reach expiry windows.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn advance(&self, delta: Duration) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for TestClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub port: u16,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<TestClock>,
    pub email_server: MockServer,
    pub client: reqwest::Client,
    pub exports: TempDir,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        init_tracing();

        let mut config = get_configuration().expect("Missing configuration file.");
        let email_server = MockServer::start().await;
        let exports = TempDir::new().expect("Failed to create export directory.");

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_app_base_url(String::from("http://127.0.0.1"));
        config.set_email_client_base_url(email_server.uri());
        config.set_export_storage_path(exports.path().to_string_lossy().into_owned());

        Mock::given(path("/mail/send"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&email_server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(TestClock(Mutex::new(Utc::now())));
        let application = Application::build_with(
            config.clone(),
            Repositories::in_memory(store.clone()),
            clock.clone(),
        )
        .await
        .expect("Failed to build application.");
        let port = application.get_port();

        tokio::spawn(application.run_until_stop());

        TestApp {
            config,
            address: format!("http://127.0.0.1:{}", port),
            port,
            store,
            clock,
            email_server,
            client: reqwest::Client::new(),
            exports,
        }
    }

    pub async fn get(&self, route: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, route))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_json(&self, route: &str, body: &Value) -> Response {
        self.client
            .post(format!("{}{}", self.address, route))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_subscription(&self, email: &str) -> Response {
        self.post_json(
            "/email/subscribe",
            &serde_json::json!({ "email": email, "consent": true }),
        )
        .await
    }

    pub async fn post_data_request(&self, email: &str, request_type: &str) -> Response {
        self.post_json(
            "/gdpr/request-data",
            &serde_json::json!({ "email": email, "requestType": request_type }),
        )
        .await
    }

    /// Links found in every email sent so far whose path starts with `prefix`,
    /// pointed at the running application.
    pub async fn email_links(&self, prefix: &str) -> Vec<Url> {
        let requests = self.email_server.received_requests().await.unwrap();

        requests
            .iter()
            .flat_map(|request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let html = body["content"][0]["value"].as_str().unwrap().to_owned();

                linkify::LinkFinder::new()
                    .links(&html)
                    .filter(|link| *link.kind() == linkify::LinkKind::Url)
                    .map(|link| Url::parse(link.as_str()).unwrap())
                    .collect::<Vec<_>>()
            })
            .filter(|link| link.path().starts_with(prefix))
            .map(|mut link| {
                link.set_port(Some(self.port)).unwrap();
                link
            })
            .collect()
    }

    /// Most recent link sent by email whose path starts with `prefix`.
    pub async fn last_email_link(&self, prefix: &str) -> Url {
        self.email_links(prefix)
            .await
            .pop()
            .unwrap_or_else(|| panic!("No email link starting with {}", prefix))
    }

    /// Subscribes `email` and follows the verification link.
    pub async fn verified_subscriber(&self, email: &str) {
        self.post_subscription(email).await.error_for_status().unwrap();
        let link = self.last_email_link("/email/verify/").await;
        self.client
            .get(link)
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap();
    }

    pub fn audit_entries(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.store
            .audit_entries()
            .into_iter()
            .filter(|entry| entry.action == action)
            .collect()
    }

    pub async fn seed_admin(&self, email: &str, role: AdminRole) -> Uuid {
        let password_hash = hash_password(&Secret::new(ADMIN_PASSWORD.to_string())).unwrap();
        let admin = AdminUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            role,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: self.clock.utc(),
        };
        AdminRepository::insert(self.store.as_ref(), &admin)
            .await
            .unwrap();

        admin.id
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> Response {
        self.post_json(
            "/admin/login",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Seeds an admin with `role` and returns a bearer token for it.
    pub async fn admin_token(&self, role: AdminRole) -> String {
        let email = format!("{}@admin.test", Uuid::new_v4());
        self.seed_admin(&email, role).await;
        let body: Value = self
            .admin_login(&email, ADMIN_PASSWORD)
            .await
            .json()
            .await
            .unwrap();

        body["token"].as_str().unwrap().to_owned()
    }

    pub async fn admin_get(&self, route: &str, token: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, route))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

use chrono::Duration;
use serde_json::Value;

use consent_ledger::domain::audit::AuditAction;
use consent_ledger::repository::DataRequestRepository;

use crate::helpers::TestApp;

async fn submit(test_app: &TestApp, email: &str, request_type: &str) -> String {
    let response = test_app.post_data_request(email, request_type).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();

    body["dataRequestId"].as_str().unwrap().to_owned()
}

async fn verify(test_app: &TestApp) -> reqwest::Response {
    let link = test_app.last_email_link("/gdpr/verify-request/").await;

    test_app.client.get(link).send().await.unwrap()
}

async fn status_of(test_app: &TestApp, request_id: &str) -> Value {
    let body: Value = test_app
        .get(&format!("/gdpr/request-status/{}", request_id))
        .await
        .json()
        .await
        .unwrap();

    body["request"].clone()
}

#[tokio::test]
async fn submitting_a_request_sends_a_verification_link() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.post_data_request("frank@test.com", "EXPORT").await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["estimatedProcessingTime"], "30 days");
    assert_eq!(test_app.email_links("/gdpr/verify-request/").await.len(), 1);
    assert_eq!(test_app.audit_entries(AuditAction::GdprRequestCreated).len(), 1);

    let request = status_of(&test_app, body["dataRequestId"].as_str().unwrap()).await;
    assert_eq!(request["status"], "PENDING");
    assert_eq!(request["type"], "EXPORT");
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;
    let test_cases = vec![
        ("frank@test.com", "EVERYTHING", "unknown request type"),
        ("frank@test.com", "export", "lowercase request type"),
        ("not-an-email", "EXPORT", "invalid email"),
    ];

    for (email, request_type, description) in test_cases {
        let response = test_app.post_data_request(email, request_type).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
    }
    assert!(test_app.email_links("/gdpr/").await.is_empty());
}

#[tokio::test]
async fn verified_export_request_produces_a_downloadable_export() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let request_id = submit(&test_app, "frank@test.com", "EXPORT").await;

    let response = verify(&test_app).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "PROCESSED");
    assert_eq!(body["requestType"], "EXPORT");
    assert_eq!(body["data"]["dataFound"], true);

    let download = test_app.last_email_link("/gdpr/download-export/").await;
    let response = test_app.client.get(download).send().await.unwrap();
    assert_eq!(200, response.status().as_u16());
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("my-data-export-"));
    let export: Value = response.json().await.unwrap();
    assert_eq!(export["requestEmail"], "frank@test.com");
    assert_eq!(export["subscriber"]["isVerified"], true);
    assert!(!export["auditLogs"].as_array().unwrap().is_empty());

    let request = status_of(&test_app, &request_id).await;
    assert_eq!(request["status"], "COMPLETED");
    assert!(request["exportExpiresAt"].is_string());
    assert_eq!(test_app.audit_entries(AuditAction::DataExportDownloaded).len(), 1);
}

#[tokio::test]
async fn verifying_a_processed_request_again_does_not_reprocess_it() {
    let test_app = TestApp::spawn_app().await;
    submit(&test_app, "frank@test.com", "EXPORT").await;
    verify(&test_app).await;

    let response = verify(&test_app).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Request already processed");
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(test_app.audit_entries(AuditAction::DataExportCreated).len(), 1);
}

#[tokio::test]
async fn portability_exports_are_marked_portable() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    submit(&test_app, "frank@test.com", "PORTABILITY").await;
    verify(&test_app).await;

    let download = test_app.last_email_link("/gdpr/download-export/").await;
    let export: Value = test_app
        .client
        .get(download)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(export["format"], "portable");
}

#[tokio::test]
async fn export_links_stop_working_after_they_expire() {
    let test_app = TestApp::spawn_app().await;
    submit(&test_app, "frank@test.com", "EXPORT").await;
    verify(&test_app).await;
    let download = test_app.last_email_link("/gdpr/download-export/").await;

    test_app.clock.advance(Duration::hours(72));
    let response = test_app.client.get(download).send().await.unwrap();

    assert_eq!(410, response.status().as_u16());
}

#[tokio::test]
async fn unknown_exports_are_not_found() {
    let test_app = TestApp::spawn_app().await;

    let not_a_uuid = test_app.get("/gdpr/download-export/whatever").await;
    let unknown = test_app
        .get(&format!("/gdpr/download-export/{}", uuid::Uuid::new_v4()))
        .await;

    assert_eq!(404, not_a_uuid.status().as_u16());
    assert_eq!(404, unknown.status().as_u16());
}

#[tokio::test]
async fn verified_delete_request_erases_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let request_id = submit(&test_app, "frank@test.com", "DELETE").await;

    let response = verify(&test_app).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["deletedRecords"]["subscribers"], 1);
    assert_eq!(test_app.store.subscriber_count(), 0);
    assert!(test_app
        .audit_entries(AuditAction::SubscriptionCreated)
        .is_empty());
    assert_eq!(
        test_app.audit_entries(AuditAction::DataDeletionCompleted).len(),
        1
    );

    let request = status_of(&test_app, &request_id).await;
    assert_eq!(request["status"], "COMPLETED");
}

#[tokio::test]
async fn erasure_removes_earlier_requests_and_their_export_files() {
    let test_app = TestApp::spawn_app().await;
    let early_id = submit(&test_app, "late@test.com", "EXPORT").await;
    assert_eq!(200, verify(&test_app).await.status().as_u16());
    assert_eq!(std::fs::read_dir(test_app.exports.path()).unwrap().count(), 1);
    test_app.verified_subscriber("late@test.com").await;
    submit(&test_app, "late@test.com", "DELETE").await;

    let response = verify(&test_app).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["deletedRecords"]["exportFiles"], 1);
    assert_eq!(std::fs::read_dir(test_app.exports.path()).unwrap().count(), 0);
    let early = DataRequestRepository::find_by_id(
        test_app.store.as_ref(),
        early_id.parse().unwrap(),
    )
    .await
    .unwrap();
    assert!(early.is_none());
}

#[tokio::test]
async fn restrict_request_deactivates_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    submit(&test_app, "frank@test.com", "RESTRICT").await;

    let response = verify(&test_app).await;

    assert_eq!(200, response.status().as_u16());
    assert_eq!(test_app.audit_entries(AuditAction::ProcessingRestricted).len(), 1);
    let response = test_app.post_subscription("frank@test.com").await;
    let body: Value = response.json().await.unwrap();
    assert!(body["alreadySubscribed"].is_null());
}

#[tokio::test]
async fn verification_links_expire_after_seven_days() {
    let test_app = TestApp::spawn_app().await;
    let request_id = submit(&test_app, "frank@test.com", "EXPORT").await;

    test_app.clock.advance(Duration::days(7) + Duration::seconds(1));
    let response = verify(&test_app).await;

    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOKEN_EXPIRED");
    let request = status_of(&test_app, &request_id).await;
    assert_eq!(request["status"], "EXPIRED");
    assert_eq!(test_app.audit_entries(AuditAction::GdprRequestExpired).len(), 1);
}

#[tokio::test]
async fn unknown_tokens_and_requests_are_not_found() {
    let test_app = TestApp::spawn_app().await;

    let verify = test_app.get("/gdpr/verify-request/not-a-real-token").await;
    let status = test_app
        .get(&format!("/gdpr/request-status/{}", uuid::Uuid::new_v4()))
        .await;

    assert_eq!(404, verify.status().as_u16());
    assert_eq!(404, status.status().as_u16());
    assert_eq!(
        test_app.audit_entries(AuditAction::GdprVerificationFailed).len(),
        1
    );
}

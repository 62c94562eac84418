use serde_json::Value;

use consent_ledger::domain::audit::AuditAction;

use crate::helpers::TestApp;

#[tokio::test]
async fn subscribe_returns_201_when_body_is_valid() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.post_subscription("frank@test.com").await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requiresVerification"], true);
    assert!(body["subscriberId"].is_string());
    assert!(body["requestId"].is_string());
    assert_eq!(test_app.store.subscriber_count(), 1);
}

#[tokio::test]
async fn subscribe_sends_a_verification_email() {
    let test_app = TestApp::spawn_app().await;

    test_app.post_subscription("frank@test.com").await;

    let links = test_app.email_links("/email/verify/").await;
    assert_eq!(links.len(), 1);
    assert_eq!(test_app.audit_entries(AuditAction::SubscriptionCreated).len(), 1);
}

#[tokio::test]
async fn subscribe_without_explicit_consent_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let test_cases = vec![
        (serde_json::json!({ "email": "frank@test.com" }), "missing consent"),
        (
            serde_json::json!({ "email": "frank@test.com", "consent": false }),
            "consent refused",
        ),
    ];

    for (body, description) in test_cases {
        let response = test_app.post_json("/email/subscribe", &body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "CONSENT_REQUIRED");
    }

    assert_eq!(test_app.store.subscriber_count(), 0);
    assert_eq!(
        test_app.audit_entries(AuditAction::ConsentValidationFailed).len(),
        2
    );
}

#[tokio::test]
async fn subscribe_returns_400_when_fields_are_invalid() {
    let test_app = TestApp::spawn_app().await;
    let test_cases = vec![
        (serde_json::json!({ "email": "", "consent": true }), "empty email"),
        (
            serde_json::json!({ "email": "not-an-email", "consent": true }),
            "invalid email",
        ),
        (serde_json::json!({ "consent": true }), "missing email"),
    ];

    for (body, description) in test_cases {
        let response = test_app.post_json("/email/subscribe", &body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["requestId"].is_string());
    }
}

#[tokio::test]
async fn subscribing_twice_before_verifying_is_reported_as_pending() {
    let test_app = TestApp::spawn_app().await;

    test_app.post_subscription("frank@test.com").await;
    let response = test_app.post_subscription("Frank@Test.com").await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alreadyPending"], true);
    assert_eq!(test_app.store.subscriber_count(), 1);
}

#[tokio::test]
async fn subscribing_after_verification_reports_already_subscribed() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;

    let response = test_app.post_subscription("frank@test.com").await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alreadySubscribed"], true);
    assert_eq!(
        test_app
            .audit_entries(AuditAction::DuplicateSubscriptionAttempt)
            .len(),
        1
    );
}

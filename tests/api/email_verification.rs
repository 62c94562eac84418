use chrono::Duration;
use serde_json::Value;

use consent_ledger::domain::audit::AuditAction;

use crate::helpers::TestApp;

#[tokio::test]
async fn verification_link_verifies_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_subscription("frank@test.com").await;
    let link = test_app.last_email_link("/email/verify/").await;

    let response = test_app.client.get(link).send().await.unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["verified"], true);
    assert_eq!(test_app.audit_entries(AuditAction::EmailVerified).len(), 1);
}

#[tokio::test]
async fn verification_sends_a_welcome_email_with_an_unsubscribe_link() {
    let test_app = TestApp::spawn_app().await;

    test_app.verified_subscriber("frank@test.com").await;

    assert_eq!(test_app.email_links("/email/unsubscribe/").await.len(), 1);
}

#[tokio::test]
async fn clicking_the_verification_link_twice_reports_already_verified() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_subscription("frank@test.com").await;
    let link = test_app.last_email_link("/email/verify/").await;
    test_app.client.get(link.clone()).send().await.unwrap();

    let response = test_app.client.get(link).send().await.unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alreadyVerified"], true);
    assert_eq!(test_app.audit_entries(AuditAction::EmailVerified).len(), 1);
}

#[tokio::test]
async fn unknown_verification_tokens_are_rejected_with_404() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/email/verify/not-a-real-token").await;

    assert_eq!(404, response.status().as_u16());
    assert_eq!(test_app.audit_entries(AuditAction::VerificationFailed).len(), 1);
}

#[tokio::test]
async fn verification_links_expire_after_24_hours() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_subscription("frank@test.com").await;
    let link = test_app.last_email_link("/email/verify/").await;

    test_app.clock.advance(Duration::hours(25));
    let response = test_app.client.get(link).send().await.unwrap();

    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOKEN_EXPIRED");
    assert_eq!(test_app.audit_entries(AuditAction::VerificationExpired).len(), 1);
}

#[tokio::test]
async fn resend_issues_a_fresh_link_for_pending_subscribers() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_subscription("frank@test.com").await;
    test_app.clock.advance(Duration::hours(25));

    let response = test_app
        .post_json(
            "/email/resend-verification",
            &serde_json::json!({ "email": "frank@test.com" }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    let links = test_app.email_links("/email/verify/").await;
    assert_eq!(links.len(), 2);
    let response = test_app.client.get(links[1].clone()).send().await.unwrap();
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn resend_for_an_unknown_address_does_not_reveal_it() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .post_json(
            "/email/resend-verification",
            &serde_json::json!({ "email": "nobody@test.com" }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    assert!(test_app.email_links("/email/verify/").await.is_empty());
}

#[tokio::test]
async fn resend_for_a_verified_address_reports_already_verified() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;

    let response = test_app
        .post_json(
            "/email/resend-verification",
            &serde_json::json!({ "email": "frank@test.com" }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alreadyVerified"], true);
}

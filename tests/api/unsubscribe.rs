use serde_json::Value;

use consent_ledger::domain::audit::AuditAction;
use consent_ledger::domain::consent::LegalBasis;

use crate::helpers::TestApp;

#[tokio::test]
async fn unsubscribe_link_deactivates_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let link = test_app.last_email_link("/email/unsubscribe/").await;

    let response = test_app.client.get(link).send().await.unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["unsubscribed"], true);
    let entries = test_app.audit_entries(AuditAction::Unsubscribed);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].legal_basis, Some(LegalBasis::ConsentWithdrawn));
}

#[tokio::test]
async fn unsubscribe_link_can_be_followed_again() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let link = test_app.last_email_link("/email/unsubscribe/").await;
    test_app.client.get(link.clone()).send().await.unwrap();

    let response = test_app.client.get(link).send().await.unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alreadyUnsubscribed"], true);
}

#[tokio::test]
async fn unknown_unsubscribe_tokens_are_rejected_with_404() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/email/unsubscribe/not-a-real-token").await;

    assert_eq!(404, response.status().as_u16());
    assert_eq!(test_app.audit_entries(AuditAction::UnsubscribeFailed).len(), 1);
}

#[tokio::test]
async fn subscribing_again_after_unsubscribing_reactivates() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let link = test_app.last_email_link("/email/unsubscribe/").await;
    test_app.client.get(link).send().await.unwrap();

    let response = test_app.post_subscription("frank@test.com").await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["requiresVerification"], true);
    assert_eq!(test_app.store.subscriber_count(), 1);
    assert_eq!(
        test_app.audit_entries(AuditAction::SubscriptionReactivated).len(),
        1
    );
}

use serde_json::Value;

use consent_ledger::domain::audit::AuditAction;

use crate::helpers::TestApp;

#[tokio::test]
async fn cookie_preferences_are_recorded_and_audited() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .client
        .post(format!("{}/consent", test_app.address))
        .header("User-Agent", "consent-tests")
        .json(&serde_json::json!({
            "consent": { "essential": true, "analytics": false, "marketing": true },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["consentId"].is_string());

    let entries = test_app.audit_entries(AuditAction::ConsentRecorded);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_agent.as_deref(), Some("consent-tests"));
    assert_eq!(
        entries[0].request_id.as_deref(),
        body["requestId"].as_str()
    );
    let new_data = entries[0].new_data.clone().unwrap();
    assert_eq!(new_data["source"], "cookie_banner");
    assert_eq!(new_data["preferences"]["marketing"], true);
}

#[tokio::test]
async fn a_custom_source_is_kept() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .post_json(
            "/consent",
            &serde_json::json!({
                "consent": { "essential": true, "analytics": true, "marketing": false },
                "source": "preferences_page",
            }),
        )
        .await;

    let entries = test_app.audit_entries(AuditAction::ConsentRecorded);
    assert_eq!(
        entries[0].new_data.as_ref().unwrap()["source"],
        "preferences_page"
    );
}

#[tokio::test]
async fn incomplete_preferences_are_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;
    let test_cases = vec![
        (serde_json::json!({}), "missing consent"),
        (
            serde_json::json!({ "consent": { "essential": true } }),
            "missing categories",
        ),
        (
            serde_json::json!({ "consent": { "essential": "yes", "analytics": false, "marketing": false } }),
            "non boolean category",
        ),
    ];

    for (body, description) in test_cases {
        let response = test_app.post_json("/consent", &body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
    }
    assert!(test_app
        .audit_entries(AuditAction::ConsentRecorded)
        .is_empty());
}

use chrono::Duration;
use serde_json::Value;

use consent_ledger::domain::admin::AdminRole;
use consent_ledger::domain::audit::AuditAction;

use crate::helpers::{TestApp, ADMIN_PASSWORD};

#[tokio::test]
async fn login_returns_a_token_and_the_admin_profile() {
    let test_app = TestApp::spawn_app().await;
    test_app.seed_admin("root@admin.test", AdminRole::SuperAdmin).await;

    let response = test_app.admin_login("root@admin.test", ADMIN_PASSWORD).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["admin"]["email"], "root@admin.test");
    assert_eq!(body["admin"]["role"], "SUPER_ADMIN");
    assert_eq!(test_app.audit_entries(AuditAction::AdminLoginSuccess).len(), 1);
}

#[tokio::test]
async fn wrong_credentials_are_rejected_with_401() {
    let test_app = TestApp::spawn_app().await;
    test_app.seed_admin("root@admin.test", AdminRole::Admin).await;

    let wrong_password = test_app.admin_login("root@admin.test", "guess").await;
    let unknown_admin = test_app.admin_login("nobody@admin.test", ADMIN_PASSWORD).await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_admin.status().as_u16());
    assert_eq!(test_app.audit_entries(AuditAction::AdminLoginFailed).len(), 2);
}

#[tokio::test]
async fn five_failed_logins_lock_the_account() {
    let test_app = TestApp::spawn_app().await;
    test_app.seed_admin("root@admin.test", AdminRole::Admin).await;
    for _ in 0..5 {
        test_app.admin_login("root@admin.test", "guess").await;
    }

    let response = test_app.admin_login("root@admin.test", ADMIN_PASSWORD).await;

    assert_eq!(423, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ACCOUNT_LOCKED");
    assert_eq!(test_app.audit_entries(AuditAction::AdminLoginBlocked).len(), 1);

    test_app.clock.advance(Duration::minutes(31));
    let response = test_app.admin_login("root@admin.test", ADMIN_PASSWORD).await;
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn admin_routes_require_a_valid_token() {
    let test_app = TestApp::spawn_app().await;
    let routes = vec![
        "/admin/dashboard",
        "/admin/subscribers",
        "/admin/gdpr-requests",
        "/admin/audit-logs",
        "/admin/export/subscribers",
    ];

    for route in routes {
        let missing = test_app.get(route).await;
        let forged = test_app.admin_get(route, "not.a.jwt").await;

        assert_eq!(401, missing.status().as_u16(), "{} without a token", route);
        assert_eq!(401, forged.status().as_u16(), "{} with a forged token", route);
    }
    assert_eq!(test_app.audit_entries(AuditAction::AdminAuthFailed).len(), 10);
}

#[tokio::test]
async fn tokens_expire_after_the_configured_hours() {
    let test_app = TestApp::spawn_app().await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    test_app
        .clock
        .advance(Duration::hours(test_app.config.admin.jwt_expiry_hours));
    let response = test_app.admin_get("/admin/dashboard", &token).await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn viewers_cannot_read_personal_data() {
    let test_app = TestApp::spawn_app().await;
    let token = test_app.admin_token(AdminRole::Viewer).await;

    let response = test_app.admin_get("/admin/subscribers", &token).await;

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn dashboard_summarises_subscribers_requests_and_activity() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    test_app.post_subscription("ana@test.com").await;
    test_app.post_data_request("frank@test.com", "EXPORT").await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let response = test_app.admin_get("/admin/dashboard", &token).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    let dashboard = &body["dashboard"];
    assert_eq!(dashboard["subscribers"]["total"], 2);
    assert_eq!(dashboard["subscribers"]["verified"], 1);
    assert_eq!(dashboard["subscribers"]["unverified"], 1);
    assert_eq!(dashboard["gdpr"]["pendingRequests"], 1);
    assert!(dashboard["audit"]["totalCount"].as_i64().unwrap() > 0);
    let recent = dashboard["recentActivity"].as_array().unwrap();
    assert!(!recent.is_empty() && recent.len() <= 10);
}

#[tokio::test]
async fn subscribers_are_paginated_and_filtered() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    test_app.post_subscription("ana@test.com").await;
    test_app.post_subscription("bob@test.com").await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let body: Value = test_app
        .admin_get("/admin/subscribers?page=1&limit=2", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["subscribers"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);

    let body: Value = test_app
        .admin_get("/admin/subscribers?status=verified", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["subscribers"].as_array().unwrap().len(), 1);
    assert_eq!(body["subscribers"][0]["email"], "frank@test.com");

    let body: Value = test_app
        .admin_get("/admin/subscribers?search=ANA", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn out_of_range_pagination_is_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;
    let token = test_app.admin_token(AdminRole::Admin).await;
    let routes = vec![
        "/admin/subscribers?limit=0",
        "/admin/subscribers?limit=101",
        "/admin/subscribers?page=0",
        "/admin/subscribers?page=abc",
        "/admin/subscribers?page=9223372036854775807",
        "/admin/audit-logs?page=9223372036854775807",
        "/admin/audit-logs?limit=500",
        "/admin/audit-logs?action=SOMETHING_ELSE",
    ];

    for route in routes {
        let response = test_app.admin_get(route, &token).await;

        assert_eq!(400, response.status().as_u16(), "{}", route);
    }
}

#[tokio::test]
async fn audit_logs_can_be_searched() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    test_app.post_subscription("ana@test.com").await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let body: Value = test_app
        .admin_get("/admin/audit-logs?action=SUBSCRIPTION_CREATED", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["limit"], 50);
    assert_eq!(body["pagination"]["hasMore"], false);

    let body: Value = test_app
        .admin_get("/admin/audit-logs?email=frank@test.com", &token)
        .await
        .json()
        .await
        .unwrap();
    let logs = body["logs"].as_array().unwrap();
    assert!(!logs.is_empty());
    let subscriber_id = &logs[0]["subscriberId"];
    assert!(logs.iter().all(|log| &log["subscriberId"] == subscriber_id));

    let body: Value = test_app
        .admin_get("/admin/audit-logs?limit=1&page=2", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["hasMore"], true);
}

#[tokio::test]
async fn exports_are_downloaded_as_attachments_and_audited() {
    let test_app = TestApp::spawn_app().await;
    test_app.verified_subscriber("frank@test.com").await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let response = test_app.admin_get("/admin/export/subscribers", &token).await;

    assert_eq!(200, response.status().as_u16());
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(disposition.contains("subscribers-export-"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["exportMetadata"]["type"], "subscribers");
    assert_eq!(body["exportMetadata"]["recordCount"], 1);
    assert_eq!(body["data"][0]["email"], "frank@test.com");

    let entries = test_app.audit_entries(AuditAction::AdminDataExport);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].new_data.as_ref().unwrap()["exportType"], "subscribers");
}

#[tokio::test]
async fn unknown_export_types_are_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let response = test_app.admin_get("/admin/export/passwords", &token).await;

    assert_eq!(400, response.status().as_u16());
    assert!(test_app.audit_entries(AuditAction::AdminDataExport).is_empty());
}

#[tokio::test]
async fn data_requests_are_listed_for_admins() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_data_request("frank@test.com", "EXPORT").await;
    test_app.post_data_request("ana@test.com", "DELETE").await;
    let token = test_app.admin_token(AdminRole::Admin).await;

    let body: Value = test_app
        .admin_get("/admin/gdpr-requests", &token)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["requests"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn cleanup_removes_entries_past_retention() {
    let test_app = TestApp::spawn_app().await;
    test_app.post_subscription("frank@test.com").await;
    test_app.clock.advance(Duration::days(
        test_app.config.compliance.audit_retention_days + 1,
    ));
    let token = test_app.admin_token(AdminRole::Admin).await;

    let response = test_app
        .client
        .post(format!("{}/admin/audit-logs/cleanup", test_app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["deletedCount"].as_u64().unwrap() >= 1);
    assert!(test_app
        .audit_entries(AuditAction::SubscriptionCreated)
        .is_empty());
}

use serde_json::Value;

use crate::helpers::TestApp;

#[tokio::test]
async fn health_check_works() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/health_check").await;

    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(!body["requestId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn every_request_gets_its_own_request_id() {
    let test_app = TestApp::spawn_app().await;

    let first: Value = test_app.get("/health_check").await.json().await.unwrap();
    let second: Value = test_app.get("/health_check").await.json().await.unwrap();

    assert_ne!(first["requestId"], second["requestId"]);
}

//! Seller registration, login and session tests.
//!
//! These tests require a running dashboard and database. Run with:
//! `cargo test -p shelfkeeper-integration-tests -- --ignored`

use reqwest::StatusCode;
use serde_json::{Value, json};
use shelfkeeper_integration_tests::{Seller, anonymous_client, base_url, unique_email};

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_health() {
    let resp = anonymous_client()
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Failed to reach server");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "ok");
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_api_requires_session() {
    let resp = anonymous_client()
        .get(format!("{}/api/customers", base_url()))
        .send()
        .await
        .expect("Failed to reach server");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_register_starts_session() {
    let seller = Seller::register().await;

    let me = seller.get_ok("/api/auth/me").await;
    assert_eq!(me["email"], Value::String(seller.email.clone()));
    assert_eq!(me["store_name"], "Test Store");
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_duplicate_registration_conflicts() {
    let seller = Seller::register().await;

    let resp = anonymous_client()
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({
            "email": seller.email.to_uppercase(),
            "password": "another-long-password",
            "display_name": "Someone Else",
            "store_name": "Other Store",
        }))
        .send()
        .await
        .expect("Failed to register");

    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_logout_then_login() {
    let seller = Seller::register().await;

    let resp = seller.post("/api/auth/logout", &json!({})).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        seller.get("/api/auth/me").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let wrong = seller
        .post(
            "/api/auth/login",
            &json!({ "email": seller.email, "password": "not-the-password" }),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let resp = seller
        .post(
            "/api/auth/login",
            &json!({ "email": seller.email, "password": seller.password }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(seller.get("/api/auth/me").await.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_short_password_rejected() {
    let resp = anonymous_client()
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({
            "email": unique_email("seller"),
            "password": "short",
            "display_name": "Test",
            "store_name": "Test",
        }))
        .send()
        .await
        .expect("Failed to register");

    assert!(resp.status().is_client_error());
}

//! Integration tests for Shelfkeeper.
//!
//! The tests drive a running dashboard over HTTP, each one as a freshly
//! registered seller, so they can share a database.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and the dashboard
//! task db:start
//! cargo run -p shelfkeeper-admin
//!
//! # Run integration tests
//! cargo test -p shelfkeeper-integration-tests -- --ignored
//! ```
//!
//! `SHELFKEEPER_BASE_URL` overrides the default `http://localhost:3001`.

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::str::FromStr;

use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL of the dashboard under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("SHELFKEEPER_BASE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string())
}

/// A cookie-carrying client, not yet logged in.
#[must_use]
pub fn anonymous_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// An email address no other test run has used.
#[must_use]
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// Read a decimal field serialized as a string.
#[must_use]
pub fn decimal(value: &Value) -> Decimal {
    let text = value.as_str().expect("decimal should be a JSON string");
    Decimal::from_str(text).expect("decimal should parse")
}

/// A logged-in seller session.
pub struct Seller {
    pub client: Client,
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub id: String,
}

impl Seller {
    /// Register a new seller and keep its session cookie.
    pub async fn register() -> Self {
        let client = anonymous_client();
        let base_url = base_url();
        let email = unique_email("seller");
        let password = "integration-test-password".to_string();

        let resp = client
            .post(format!("{base_url}/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": password,
                "display_name": "Test Seller",
                "store_name": "Test Store",
            }))
            .send()
            .await
            .expect("Failed to register seller");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let me: Value = resp.json().await.expect("Failed to read seller");
        let id = me["id"].as_str().expect("seller id").to_string();

        Self {
            client,
            base_url,
            email,
            password,
            id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST failed")
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Response {
        self.client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("PATCH failed")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE failed")
    }

    /// POST and return the body, asserting the expected status.
    pub async fn post_ok(&self, path: &str, body: &Value, expected: StatusCode) -> Value {
        let resp = self.post(path, body).await;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        assert_eq!(status, expected, "POST {path}: {body}");
        body
    }

    /// GET and return the body, asserting 200.
    pub async fn get_ok(&self, path: &str) -> Value {
        let resp = self.get(path).await;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        assert_eq!(status, StatusCode::OK, "GET {path}: {body}");
        body
    }

    pub async fn create_customer(&self) -> String {
        let customer = self
            .post_ok(
                "/api/customers",
                &json!({ "email": unique_email("customer"), "name": "Test Customer" }),
                StatusCode::CREATED,
            )
            .await;
        id_of(&customer)
    }

    /// Create and publish a product.
    pub async fn create_product(&self, price: &str, download_limit: Option<i32>) -> String {
        let product = self
            .post_ok(
                "/api/products",
                &json!({
                    "name": "Test Pattern",
                    "price": price,
                    "download_limit": download_limit,
                }),
                StatusCode::CREATED,
            )
            .await;
        let id = id_of(&product);
        self.post_ok(
            &format!("/api/products/{id}/status"),
            &json!({ "status": "published" }),
            StatusCode::OK,
        )
        .await;
        id
    }

    pub async fn sell(&self, customer_id: &str, product_id: &str, coupon: Option<&str>) -> Value {
        self.post_ok(
            "/api/sales",
            &json!({
                "customer_id": customer_id,
                "product_id": product_id,
                "coupon_code": coupon,
            }),
            StatusCode::CREATED,
        )
        .await
    }
}

/// The `id` field of a JSON object.
#[must_use]
pub fn id_of(value: &Value) -> String {
    value["id"]
        .as_str()
        .unwrap_or_else(|| panic!("missing id in {value}"))
        .to_string()
}

//! Customer management and tenant isolation tests.
//!
//! These tests require a running dashboard and database.

use reqwest::StatusCode;
use serde_json::json;
use shelfkeeper_integration_tests::{Seller, id_of, unique_email};

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_customer_crud() {
    let seller = Seller::register().await;
    let email = unique_email("crud");

    let created = seller
        .post_ok(
            "/api/customers",
            &json!({ "email": email, "name": "Grace" }),
            StatusCode::CREATED,
        )
        .await;
    let id = id_of(&created);

    let list = seller.get_ok("/api/customers").await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["customers"][0]["id"], created["id"]);

    let resp = seller
        .patch(&format!("/api/customers/{id}"), &json!({ "notes": "VIP" }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let shown = seller.get_ok(&format!("/api/customers/{id}")).await;
    assert_eq!(shown["notes"], "VIP");
    assert_eq!(shown["name"], "Grace");

    let resp = seller.delete(&format!("/api/customers/{id}")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        seller.get(&format!("/api/customers/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_duplicate_customer_email_conflicts() {
    let seller = Seller::register().await;
    let email = unique_email("dup");

    seller
        .post_ok("/api/customers", &json!({ "email": email }), StatusCode::CREATED)
        .await;
    let resp = seller
        .post("/api/customers", &json!({ "email": email.to_uppercase() }))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_sellers_cannot_see_each_others_customers() {
    let alice = Seller::register().await;
    let bob = Seller::register().await;
    let customer = alice.create_customer().await;

    assert_eq!(
        bob.get(&format!("/api/customers/{customer}")).await.status(),
        StatusCode::NOT_FOUND
    );
    let list = bob.get_ok("/api/customers").await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_payment_methods_keep_one_default() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let path = format!("/api/customers/{customer}/payment-methods");

    let first = seller
        .post_ok(
            &path,
            &json!({
                "kind": "card",
                "label": "Visa",
                "last4": "4242",
                "exp_month": 12,
                "exp_year": 2099,
            }),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(first["is_default"], true);

    let second = seller
        .post_ok(
            &path,
            &json!({ "kind": "paypal", "label": "PayPal", "make_default": true }),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(second["is_default"], true);

    let methods = seller.get_ok(&path).await;
    let defaults = methods
        .as_array()
        .expect("list of payment methods")
        .iter()
        .filter(|m| m["is_default"] == true)
        .count();
    assert_eq!(defaults, 1);

    let bad = seller
        .post(
            &path,
            &json!({ "kind": "card", "label": "Bad", "last4": "42a2" }),
        )
        .await;
    assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

//! Entitlement checks, download limits and subscription access.
//!
//! These tests require a running dashboard and database.

use reqwest::StatusCode;
use serde_json::{Value, json};
use shelfkeeper_integration_tests::{Seller, id_of};

async fn record(seller: &Seller, body: &Value) -> (StatusCode, Value) {
    let resp = seller.post("/api/access-records", body).await;
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_download_limit_enforced() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let product = seller.create_product("8.00", Some(2)).await;
    let download = json!({
        "customer_id": customer,
        "product_id": product,
        "access_type": "download",
    });

    let (status, _) = record(&seller, &download).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "not purchased yet");

    seller.sell(&customer, &product, None).await;

    let (status, first) = record(&seller, &download).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["grant"]["remaining_downloads"], 1);

    let (status, second) = record(&seller, &download).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["grant"]["remaining_downloads"], 0);

    let (status, _) = record(&seller, &download).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Views do not count against the limit.
    let (status, _) = record(
        &seller,
        &json!({ "customer_id": customer, "product_id": product, "access_type": "view" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let summary = seller
        .get_ok(&format!("/api/access-records/summary?customer_id={customer}"))
        .await;
    assert_eq!(summary["downloads"], 2);
    assert_eq!(summary["views"], 1);
    assert_eq!(summary["unique_customers"], 1);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_trial_subscription_grants_access_until_cancelled() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let membership = seller
        .post_ok(
            "/api/memberships",
            &json!({
                "name": "Pattern Club",
                "price": "9.00",
                "billing_cycle": "monthly",
                "trial_days": 14,
            }),
            StatusCode::CREATED,
        )
        .await;
    let membership_id = id_of(&membership);

    let started = seller
        .post_ok(
            "/api/subscriptions",
            &json!({ "customer_id": customer, "membership_id": membership_id }),
            StatusCode::CREATED,
        )
        .await;
    let subscription = &started["subscription"];
    assert_eq!(subscription["status"], "trialing");
    assert!(started["first_sale"].is_null(), "trials are not charged");
    let subscription_id = id_of(subscription);

    let stream = json!({
        "customer_id": customer,
        "membership_id": membership_id,
        "access_type": "stream",
    });
    let (status, _) = record(&seller, &stream).await;
    assert_eq!(status, StatusCode::CREATED);

    let cancelled = seller
        .post_ok(
            &format!("/api/subscriptions/{subscription_id}/cancel"),
            &json!({ "at_period_end": false }),
            StatusCode::OK,
        )
        .await;
    assert_eq!(cancelled["status"], "cancelled");

    let (status, body) = record(&seller, &stream).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_paid_subscription_needs_payment_method() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let membership = seller
        .post_ok(
            "/api/memberships",
            &json!({ "name": "Monthly", "price": "5.00", "billing_cycle": "monthly" }),
            StatusCode::CREATED,
        )
        .await;
    let body = json!({ "customer_id": customer, "membership_id": id_of(&membership) });

    let resp = seller.post("/api/subscriptions", &body).await;
    assert!(resp.status().is_client_error());

    seller
        .post_ok(
            &format!("/api/customers/{customer}/payment-methods"),
            &json!({ "kind": "paypal", "label": "PayPal" }),
            StatusCode::CREATED,
        )
        .await;
    let started = seller
        .post_ok("/api/subscriptions", &body, StatusCode::CREATED)
        .await;
    assert_eq!(started["subscription"]["status"], "active");
    assert_eq!(started["first_sale"]["status"], "completed");

    let stats = seller.get_ok("/api/dashboard/stats").await;
    assert_eq!(stats["active_subscriptions"], 1);
}

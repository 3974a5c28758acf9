//! Sales, coupons, refunds and disputes.
//!
//! These tests require a running dashboard and database.

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use shelfkeeper_integration_tests::{Seller, decimal, id_of};

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_sale_with_percentage_coupon() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let product = seller.create_product("40.00", None).await;

    seller
        .post_ok(
            "/api/coupons",
            &json!({
                "code": "save10",
                "discount_type": "percentage",
                "discount_value": "10",
                "max_per_customer": 1,
            }),
            StatusCode::CREATED,
        )
        .await;

    let recorded = seller.sell(&customer, &product, Some("SAVE10")).await;
    let sale = &recorded["sale"];
    assert_eq!(sale["status"], "completed");
    assert_eq!(decimal(&sale["subtotal"]), Decimal::new(4000, 2));
    assert_eq!(decimal(&sale["discount"]), Decimal::new(400, 2));
    assert_eq!(decimal(&sale["total"]), Decimal::new(3600, 2));
    assert!(recorded["redemption"].is_object());

    // max_per_customer = 1
    let again = seller
        .post(
            "/api/sales",
            &json!({ "customer_id": customer, "product_id": product, "coupon_code": "SAVE10" }),
        )
        .await;
    assert_eq!(again.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let coupons = seller.get_ok("/api/coupons").await;
    let coupon = &coupons[0];
    assert_eq!(coupon["code"], "SAVE10");
    assert_eq!(coupon["times_redeemed"], 1);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_draft_product_cannot_be_sold() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let draft = seller
        .post_ok(
            "/api/products",
            &json!({ "name": "Unfinished", "price": "5.00" }),
            StatusCode::CREATED,
        )
        .await;

    let resp = seller
        .post(
            "/api/sales",
            &json!({ "customer_id": customer, "product_id": id_of(&draft) }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_refund_once() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let product = seller.create_product("12.00", None).await;
    let sale_id = id_of(&seller.sell(&customer, &product, None).await["sale"]);

    let refunded = seller
        .post_ok(
            &format!("/api/sales/{sale_id}/refund"),
            &json!({ "reason": "changed mind" }),
            StatusCode::OK,
        )
        .await;
    assert_eq!(refunded["status"], "refunded");
    assert_eq!(refunded["refund_reason"], "changed mind");

    let again = seller
        .post(&format!("/api/sales/{sale_id}/refund"), &json!({}))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let stats = seller.get_ok("/api/dashboard/stats").await;
    assert_eq!(decimal(&stats["gross_revenue"]), Decimal::new(1200, 2));
    assert_eq!(decimal(&stats["refunded"]), Decimal::new(1200, 2));
    assert_eq!(decimal(&stats["net_revenue"]), Decimal::ZERO);
}

#[tokio::test]
#[ignore = "Requires running dashboard server and database"]
async fn test_lost_dispute_refunds_sale() {
    let seller = Seller::register().await;
    let customer = seller.create_customer().await;
    let product = seller.create_product("25.00", None).await;
    let sale_id = id_of(&seller.sell(&customer, &product, None).await["sale"]);

    let dispute = seller
        .post_ok(
            "/api/disputes",
            &json!({ "sale_id": sale_id, "reason": "not received" }),
            StatusCode::CREATED,
        )
        .await;
    let dispute_id = id_of(&dispute);
    assert_eq!(decimal(&dispute["amount"]), Decimal::new(2500, 2));

    let duplicate = seller
        .post(
            "/api/disputes",
            &json!({ "sale_id": sale_id, "reason": "again" }),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let lost = seller
        .post_ok(
            &format!("/api/disputes/{dispute_id}/status"),
            &json!({ "status": "lost" }),
            StatusCode::OK,
        )
        .await;
    assert_eq!(lost["status"], "lost");

    let sale = seller.get_ok(&format!("/api/sales/{sale_id}")).await;
    assert_eq!(sale["status"], "refunded");

    let reopen = seller
        .post(
            &format!("/api/disputes/{dispute_id}/status"),
            &json!({ "status": "open" }),
        )
        .await;
    assert!(reopen.status().is_client_error());
}

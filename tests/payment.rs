mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{shipping, sign, spawn_app, TestApp, GATEWAY_KEY_ID};
use storefront::entities::order::{PaymentStatus, Status};

async fn cart_with_forty(app: &TestApp, token: &str) -> i32 {
    let category = app.seed_category("Basics").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 5).await;
    let cap = app.seed_product(category, "Cap", "20.00", 5).await;
    app.add_to_cart(token, tee, 2).await;
    app.add_to_cart(token, cap, 1).await;
    tee
}

fn verify_payload(order_id: &str, payment_id: &str, signature: &str) -> Value {
    let mut payload = shipping();
    payload["razorpay_order_id"] = json!(order_id);
    payload["razorpay_payment_id"] = json!(payment_id);
    payload["razorpay_signature"] = json!(signature);
    payload
}

#[tokio::test]
async fn test_create_gateway_order() {
    let app = spawn_app().await;
    let (token, _) = app.register("payer@example.com").await;

    let (status, body) = app.post_json("/payment/create-order", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cart is empty");

    cart_with_forty(&app, &token).await;
    let (status, body) = app.post_json("/payment/create-order", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 4000);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["key"], GATEWAY_KEY_ID);
    assert_eq!(body["cart_total"], "40.00");
    assert!(body["gateway_order_id"].as_str().unwrap().starts_with("order_test"));
}

#[tokio::test]
async fn test_verified_payment_creates_paid_order() {
    let app = spawn_app().await;
    let (token, _) = app.register("verified@example.com").await;
    let tee = cart_with_forty(&app, &token).await;

    let (_, checkout) = app.post_json("/payment/create-order", Some(&token), json!({})).await;
    let order_id = checkout["gateway_order_id"].as_str().unwrap().to_owned();
    let signature = sign(&order_id, "pay_001");

    let (status, body) = app
        .post_json(
            "/payment/verify",
            Some(&token),
            verify_payload(&order_id, "pay_001", &signature),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "verify failed: {body}");
    assert_eq!(body["total_amount"], "40.00");
    assert_eq!(body["payment_id"], "pay_001");
    assert_eq!(body["order"]["status"], "processing");
    assert_eq!(body["order"]["payment_status"], "PAID");
    assert_eq!(body["order"]["payment_method"], "gateway");
    assert_eq!(app.product(tee).await.stock, 3);

    let (_, cart) = app.get_json("/cart/current", Some(&token)).await;
    assert_eq!(cart["total_items"], 0);
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let app = spawn_app().await;
    let (token, _) = app.register("forger@example.com").await;
    let tee = cart_with_forty(&app, &token).await;

    let (status, body) = app
        .post_json(
            "/payment/verify",
            Some(&token),
            verify_payload("order_test1", "pay_002", &sign("order_test1", "pay_other")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment verification failed");

    // Nothing changed
    assert_eq!(app.product(tee).await.stock, 5);
    let (_, orders) = app.get_json("/orders", Some(&token)).await;
    assert!(orders.as_array().expect("Expected a list").is_empty());

    let (status, body) = app
        .post_json("/payment/verify", Some(&token), shipping())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing payment verification parameters");
}

#[tokio::test]
async fn test_replayed_payment_is_a_conflict() {
    let app = spawn_app().await;
    let (token, _) = app.register("replay@example.com").await;
    let tee = cart_with_forty(&app, &token).await;
    let payload = verify_payload("order_test1", "pay_003", &sign("order_test1", "pay_003"));

    let (status, _) = app.post_json("/payment/verify", Some(&token), payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    // Refill the cart, then replay the same payment
    app.add_to_cart(&token, tee, 1).await;
    let (status, body) = app.post_json("/payment/verify", Some(&token), payload).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Payment has already been processed");

    let (_, orders) = app.get_json("/orders", Some(&token)).await;
    assert_eq!(orders.as_array().expect("Expected a list").len(), 1);
    let (_, cart) = app.get_json("/cart/current", Some(&token)).await;
    assert_eq!(cart["total_items"], 1);
}

#[tokio::test]
async fn test_refund_request_and_completion() {
    let app = spawn_app().await;
    let (token, _) = app.register("returns@example.com").await;
    cart_with_forty(&app, &token).await;
    let (_, body) = app
        .post_json(
            "/payment/verify",
            Some(&token),
            verify_payload("order_test1", "pay_004", &sign("order_test1", "pay_004")),
        )
        .await;
    let id = body["order_id"].as_i64().expect("No order id") as i32;
    app.force_order_state(id, Status::Shipped, PaymentStatus::Paid).await;

    // Step 1: A reason is required
    let (status, body) = app
        .post_json(&format!("/orders/{id}/refund"), Some(&token), json!({ "reason": "  " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Refund reason is required");

    // Step 2: Request the refund
    let (status, body) = app
        .post_json(
            &format!("/orders/{id}/refund"),
            Some(&token),
            json!({ "reason": "damaged" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "shipped");
    assert_eq!(body["order"]["payment_status"], "REFUND_PENDING");
    assert_eq!(body["order"]["refund_info"]["reason"], "damaged");
    assert!(body["order"]["refund_info"]["completed_at"].is_null());
    assert_eq!(body["order"]["can_refund"], false);

    // Step 3: Asking twice is rejected
    let (status, _) = app
        .post_json(
            &format!("/orders/{id}/refund"),
            Some(&token),
            json!({ "reason": "Wrong size" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Step 4: Back office completes it through the gateway
    let admin = app.admin_token().await;
    let (status, body) = app
        .post_json(
            &format!("/admin/orders/{id}/complete-refund"),
            Some(&admin),
            json!({ "execute_refund": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "REFUNDED");
    assert_eq!(body["refund_status"], "completed");
    assert_eq!(body["gateway_refund_id"], "rfnd_test1");

    let refunds = app.gateway.refunds.lock().unwrap().clone();
    assert_eq!(refunds, vec![("pay_004".to_owned(), Some(4000))]);

    // Step 5: Completing again is an invalid transition
    let (status, _) = app
        .post_json(
            &format!("/admin/orders/{id}/complete-refund"),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

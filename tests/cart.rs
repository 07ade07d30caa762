mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{spawn_app, spawn_app_with};

async fn send(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let response = request.send().await.expect("Failed to send cart request");
    let status = response.status();
    let body = response
        .json::<Value>()
        .await
        .expect("Failed to parse cart response JSON");
    (status, body)
}

#[tokio::test]
async fn test_add_item_and_totals() {
    let app = spawn_app().await;
    let (token, _) = app.register("shopper@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 5).await;
    let cap = app.seed_product(category, "Cap", "20.00", 5).await;

    // Step 1: Add two lines
    let (status, body) = app.add_to_cart(&token, tee, 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Item added to cart successfully");

    let (status, body) = app.add_to_cart(&token, cap, 1).await;
    assert_eq!(status, StatusCode::CREATED);

    // Step 2: Totals are recomputed from the lines
    let cart = &body["cart"];
    assert_eq!(cart["total_items"], 3);
    assert_eq!(cart["total_price"], "40.00");
    assert_eq!(cart["items"].as_array().expect("No items").len(), 2);

    let (status, current) = app.get_json("/cart/current", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["total_price"], "40.00");
}

#[tokio::test]
async fn test_repeated_add_is_debounced() {
    let app = spawn_app().await;
    let (token, _) = app.register("double@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 5).await;

    let (status, _) = app.add_to_cart(&token, tee, 1).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.add_to_cart(&token, tee, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Item already in cart");
    assert_eq!(body["cart"]["total_items"], 1);
}

#[tokio::test]
async fn test_repeated_add_increments_without_debounce() {
    let app = spawn_app_with(&[("CART_DEBOUNCE_MS", "0")]).await;
    let (token, _) = app.register("again@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 3).await;

    app.add_to_cart(&token, tee, 1).await;
    let (status, body) = app.add_to_cart(&token, tee, 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["cart"]["items"][0]["quantity"], 3);

    // Stock is 3, so one more would overflow the line
    let (status, body) = app.add_to_cart(&token, tee, 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only 3 items available in stock");
}

#[tokio::test]
async fn test_variants_are_separate_lines() {
    let app = spawn_app_with(&[("CART_DEBOUNCE_MS", "0")]).await;
    let (token, _) = app.register("variants@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 10).await;

    for size in ["M", "L"] {
        let (status, _) = app
            .post_json(
                "/cart/add_item",
                Some(&token),
                json!({ "product_id": tee, "quantity": 1, "selected_size": size }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, cart) = app.get_json("/cart/current", Some(&token)).await;
    assert_eq!(cart["items"].as_array().expect("No items").len(), 2);
}

#[tokio::test]
async fn test_add_rejects_bad_requests() {
    let app = spawn_app().await;
    let (token, _) = app.register("picky@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 2).await;

    let (status, body) = app.add_to_cart(&token, tee, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Quantity must be at least 1");

    let (status, body) = app.add_to_cart(&token, tee, 3).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Product is out of stock or insufficient quantity");

    let (status, _) = app.add_to_cart(&token, 9999, 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_remove_and_clear() {
    let app = spawn_app().await;
    let (token, _) = app.register("editor@example.com").await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 4).await;
    let cap = app.seed_product(category, "Cap", "20.00", 4).await;

    let (_, body) = app.add_to_cart(&token, tee, 1).await;
    let item_id = body["cart"]["items"][0]["id"].as_i64().expect("No item id");
    app.add_to_cart(&token, cap, 1).await;

    // Step 1: Update quantity
    let (status, body) = send(
        app.client
            .patch(app.url("/cart/update_item"))
            .headers(common::bearer(&token))
            .json(&json!({ "item_id": item_id, "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["total_price"], "60.00");

    let (status, body) = send(
        app.client
            .patch(app.url("/cart/update_item"))
            .headers(common::bearer(&token))
            .json(&json!({ "item_id": item_id, "quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only 4 items available");

    // Step 2: Remove the line, then removing it again is a 404
    let (status, body) = send(
        app.client
            .delete(app.url(&format!("/cart/remove_item?item_id={item_id}")))
            .headers(common::bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["total_items"], 1);

    let (status, _) = send(
        app.client
            .delete(app.url(&format!("/cart/remove_item?item_id={item_id}")))
            .headers(common::bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app.client
            .delete(app.url("/cart/remove_item"))
            .headers(common::bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "item_id parameter is required");

    // Step 3: Clear
    let (status, body) = send(
        app.client
            .delete(app.url("/cart/clear"))
            .headers(common::bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Cart cleared successfully. Removed 1 items.");
    assert_eq!(body["cart"]["total_price"], "0.00");
}

#[tokio::test]
async fn test_guest_cart_follows_session_header() {
    let app = spawn_app().await;
    let category = app.seed_category("Tees").await;
    let tee = app.seed_product(category, "Basic Tee", "10.00", 5).await;

    // Step 1: First guest request is issued a session
    let response = app
        .client
        .post(app.url("/cart/add_item"))
        .json(&json!({ "product_id": tee }))
        .send()
        .await
        .expect("Failed to send guest add");
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = response
        .headers()
        .get("x-cart-session")
        .and_then(|h| h.to_str().ok())
        .expect("No cart session issued")
        .to_owned();

    // Step 2: The session sees its cart
    let response = app
        .client
        .get(app.url("/cart/current"))
        .header("x-cart-session", &session)
        .send()
        .await
        .expect("Failed to fetch guest cart");
    let body = response
        .json::<Value>()
        .await
        .expect("Failed to parse cart JSON");
    assert_eq!(body["total_items"], 1);

    // Step 3: A different guest starts empty
    let (status, other) = app.get_json("/cart/current", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["total_items"], 0);
    assert!(other["id"].is_null());
}

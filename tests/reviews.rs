mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn test_reviews_update_product_rating() {
    let app = spawn_app().await;
    let category = app.seed_category("Boots").await;
    let boot = app.seed_product(category, "Hiker", "140.00", 6).await;

    // Step 1: Three customers rate the product
    for (email, rating) in [("a@example.com", 5), ("b@example.com", 4), ("c@example.com", 4)] {
        let (token, _) = app.register(email).await;
        let (status, body) = app
            .post_json(
                "/reviews",
                Some(&token),
                json!({ "product_id": boot, "rating": rating, "comment": "Solid" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "review failed: {body}");
        assert_eq!(body["user"], "Test");
    }

    // Step 2: Mean of 5, 4, 4 rounds to 4.3
    let (status, product) = app.get_json(&format!("/products/{boot}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["rating"], "4.3");
    assert_eq!(product["reviews_count"], 3);

    // Step 3: Public listing, newest first
    let (status, list) = app
        .get_json(&format!("/reviews?product_id={boot}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ratings: Vec<i64> = list
        .as_array()
        .expect("Expected a list")
        .iter()
        .map(|r| r["rating"].as_i64().unwrap())
        .collect();
    assert_eq!(ratings, [4, 4, 5]);
}

#[tokio::test]
async fn test_one_review_per_user_and_product() {
    let app = spawn_app().await;
    let category = app.seed_category("Boots").await;
    let boot = app.seed_product(category, "Hiker", "140.00", 6).await;
    let (token, _) = app.register("repeat@example.com").await;

    let payload = json!({ "product_id": boot, "rating": 5 });
    let (status, _) = app.post_json("/reviews", Some(&token), payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post_json("/reviews", Some(&token), payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You have already reviewed this product");

    let (_, product) = app.get_json(&format!("/products/{boot}"), None).await;
    assert_eq!(product["reviews_count"], 1);
}

#[tokio::test]
async fn test_review_validation() {
    let app = spawn_app().await;
    let category = app.seed_category("Boots").await;
    let boot = app.seed_product(category, "Hiker", "140.00", 6).await;
    let (token, _) = app.register("strict@example.com").await;

    let (status, body) = app
        .post_json("/reviews", Some(&token), json!({ "product_id": boot, "rating": 6 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "rating: must be between 1 and 5");

    let (status, _) = app
        .post_json("/reviews", Some(&token), json!({ "product_id": 4242, "rating": 3 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Writing needs an account; reading does not
    let (status, _) = app
        .post_json("/reviews", None, json!({ "product_id": boot, "rating": 3 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get_json("/reviews", None).await;
    assert_eq!(status, StatusCode::OK);
}

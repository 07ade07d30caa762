mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{spawn_app, GOOGLE_TOKEN};

#[tokio::test]
async fn test_register_and_login() {
    let app = spawn_app().await;

    // Step 1: Register
    let (access, _) = app.register("Asha@Example.com").await;

    // Step 2: Profile is reachable with the issued token
    let (status, body) = app.get_json("/accounts/profile", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "asha@example.com");

    // Step 3: Login with the same credentials, any casing
    let (status, body) = app
        .post_json(
            "/accounts/login",
            None,
            json!({ "email": "asha@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["tokens"]["access"].is_string());
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let app = spawn_app().await;
    app.register("dup@example.com").await;

    let (status, body) = app
        .post_json(
            "/accounts/register",
            None,
            json!({ "email": "dup@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "User with this email already exists");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    app.register("wrong@example.com").await;

    let (status, body) = app
        .post_json(
            "/accounts/login",
            None,
            json!({ "email": "wrong@example.com", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app().await;

    let (status, _) = app.get_json("/orders", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get_json("/orders", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_token_is_forbidden_on_admin_routes() {
    let app = spawn_app().await;
    let (access, _) = app.register("plain@example.com").await;

    let (status, _) = app.get_json("/admin/orders", Some(&access)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let (status, body) = app.get_json("/admin/orders", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().expect("Expected a list").is_empty());
}

#[tokio::test]
async fn test_refresh_then_logout_revokes() {
    let app = spawn_app().await;
    let (_, refresh) = app.register("rotate@example.com").await;

    // Step 1: Refresh works while the token is live
    let (status, body) = app
        .post_json("/accounts/token/refresh", None, json!({ "refresh": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["access"].as_str().expect("No access token").to_owned();

    // Step 2: Logout revokes the refresh token
    let (status, _) = app
        .post_json("/accounts/logout", Some(&access), json!({ "refresh": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Step 3: The revoked token can no longer refresh or log out again
    let (status, body) = app
        .post_json("/accounts/token/refresh", None, json!({ "refresh": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");

    let (status, _) = app
        .post_json("/accounts/logout", Some(&access), json!({ "refresh": refresh }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let app = spawn_app().await;
    let (access, _) = app.register("kinds@example.com").await;

    let (status, _) = app
        .post_json("/accounts/token/refresh", None, json!({ "refresh": access }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_update() {
    let app = spawn_app().await;
    let (access, _) = app.register("profile@example.com").await;

    let response = app
        .client
        .patch(app.url("/accounts/profile"))
        .headers(common::bearer(&access))
        .json(&json!({ "first_name": "Asha", "phone": "9876543210" }))
        .send()
        .await
        .expect("Failed to send profile update");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse profile JSON");
    assert_eq!(body["user"]["first_name"], "Asha");
    assert_eq!(body["user"]["email"], "profile@example.com");
}

#[tokio::test]
async fn test_google_login_creates_account_once() {
    let app = spawn_app().await;

    let (status, first) = app
        .post_json("/accounts/google-login", None, json!({ "token": GOOGLE_TOKEN }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user"]["email"], "google.user@example.com");

    let (status, second) = app
        .post_json("/accounts/google-login", None, json!({ "credential": GOOGLE_TOKEN }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user"]["id"], second["user"]["id"]);

    let (status, body) = app
        .post_json("/accounts/google-login", None, json!({ "token": "forged" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = spawn_app().await;
    app.register("forgetful@example.com").await;

    // Step 1: Unknown addresses get the same answer and no mail
    let (status, _) = app
        .post_json("/accounts/forgot-password", None, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.mailer.sent.lock().unwrap().is_empty());

    // Step 2: Request a reset link
    let (status, _) = app
        .post_json("/accounts/forgot-password", None, json!({ "email": "forgetful@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let mail = app.mailer.sent.lock().unwrap().pop().expect("No reset mail sent");
    assert_eq!(mail.to, "forgetful@example.com");
    let link = mail
        .body
        .lines()
        .find(|line| line.contains("/reset-password/"))
        .expect("Reset link missing from mail")
        .to_owned();
    let mut parts = link.rsplit('/');
    let token = parts.next().expect("No token").to_owned();
    let uid = parts.next().expect("No uid").to_owned();

    // Step 3: Link validates
    let (status, _) = app
        .get_json(&format!("/accounts/validate-reset-token/{uid}/{token}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Step 4: Mismatched confirmation is rejected
    let (status, body) = app
        .post_json(
            &format!("/accounts/reset-password/{uid}/{token}"),
            None,
            json!({ "password": "brandnew123", "confirm_password": "different123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Passwords do not match");

    // Step 5: Reset, then the link is spent because the hash changed
    let (status, _) = app
        .post_json(
            &format!("/accounts/reset-password/{uid}/{token}"),
            None,
            json!({ "password": "brandnew123", "confirm_password": "brandnew123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get_json(&format!("/accounts/validate-reset-token/{uid}/{token}"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Step 6: New password logs in
    let (status, _) = app
        .post_json(
            "/accounts/login",
            None,
            json!({ "email": "forgetful@example.com", "password": "brandnew123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

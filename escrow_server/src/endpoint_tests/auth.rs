use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Duration;
use escrow_engine::db_types::Role;

use super::helpers::{admin_token, bearer, issuer, token_for, TestContext};
use crate::{auth::TokenIssuer, config::AuthConfig};

#[actix_web::test]
async fn health_needs_no_token() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let (status, body) = ctx.request(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn api_routes_need_a_token() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let (status, body) = ctx.request(TestRequest::post().uri("/api/auto_release/run")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided"), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn malformed_authorization_header() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let req = TestRequest::post().uri("/api/auto_release/run").insert_header(("Authorization", "Token abc"));
    let (status, _) = ctx.request(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn token_signed_with_another_secret() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let forger = TokenIssuer::new(&AuthConfig::new("guessed-secret"));
    let token = forger.issue_token("admin-1", vec![Role::Admin], None).unwrap();
    let (status, body) = ctx.request(TestRequest::post().uri("/api/auto_release/run").insert_header(bearer(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("InvalidSignature"), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn expired_token() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let token = issuer().issue_token("admin-1", vec![Role::Admin], Some(Duration::hours(-2))).unwrap();
    let (status, _) = ctx.request(TestRequest::post().uri("/api/auto_release/run").insert_header(bearer(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn sellers_cannot_use_admin_routes() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-1", "seller-1").await;
    ctx.manual_payout_seller("seller-1").await;
    let token = token_for("seller-1", vec![Role::Seller]);
    let req = TestRequest::post().uri("/api/orders/ord-1/release").insert_header(bearer(&token));
    let (status, body) = ctx.request(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Access denied"), "{body}");
    // Nothing was paid out
    assert!(!ctx.fetch_order("ord-1").await.is_released());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn admins_are_not_sellers() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let req = TestRequest::get().uri("/api/payout_profile").insert_header(bearer(&admin_token()));
    let (status, _) = ctx.request(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    ctx.tear_down().await;
}

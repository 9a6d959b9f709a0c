use actix_web::{http::StatusCode, test::TestRequest};
use escrow_engine::db_types::{PayoutMethod, PayoutProfile, Role};
use serde_json::json;

use super::helpers::{bearer, token_for, TestContext};

#[actix_web::test]
async fn sellers_manage_their_own_payout_profile() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let token = token_for("seller-1", vec![Role::Seller]);

    let (status, _) = ctx.request(TestRequest::get().uri("/api/payout_profile").insert_header(bearer(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({
        "mobile_money_b": "08021234567",
        "bank": { "account_name": "Ada Obi", "account_number": "0123456789", "bank_code": "058" }
    });
    let req = TestRequest::put().uri("/api/payout_profile").insert_header(bearer(&token)).set_json(body);
    let (status, body) = ctx.request(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let saved: PayoutProfile = serde_json::from_str(&body).unwrap();
    assert_eq!(saved.seller_id, "seller-1");
    assert_eq!(saved.resolve_channel().map(|c| c.method()), Some(PayoutMethod::BankTransfer));

    let (status, body) = ctx.request(TestRequest::get().uri("/api/payout_profile").insert_header(bearer(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: PayoutProfile = serde_json::from_str(&body).unwrap();
    assert_eq!(fetched.mobile_money_b.as_deref(), Some("08021234567"));
    assert!(fetched.bank.is_some());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn incomplete_bank_details_are_rejected() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let token = token_for("seller-2", vec![Role::Seller]);
    let body = json!({ "bank": { "account_name": "Ada Obi", "account_number": "", "bank_code": "058" } });
    let req = TestRequest::put().uri("/api/payout_profile").insert_header(bearer(&token)).set_json(body);
    let (status, body) = ctx.request(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid payout profile"), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn seller_id_comes_from_the_token() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let token = token_for("seller-3", vec![Role::Seller]);
    // Extra fields are ignored; sellers cannot write someone else's profile
    let body = json!({ "seller_id": "seller-4", "mobile_money_a": "08030000000" });
    let req = TestRequest::put().uri("/api/payout_profile").insert_header(bearer(&token)).set_json(body);
    let (status, _) = ctx.request(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ctx.orders.fetch_payout_profile("seller-3").await.unwrap().is_some());
    assert!(ctx.orders.fetch_payout_profile("seller-4").await.unwrap().is_none());
    ctx.tear_down().await;
}

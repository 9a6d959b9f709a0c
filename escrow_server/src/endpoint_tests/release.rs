use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use escrow_common::Money;
use escrow_engine::{
    db_types::{
        OrderId,
        OrderStatusType,
        PaymentStatus,
        PayoutMethod,
        PayoutProfile,
        ReleaseClaim,
        ReleaseTrigger,
        Role,
    },
    gateways::PayoutRails,
    OrderDetails,
    ReleaseManagement,
};

use super::{
    helpers::{admin_token, bearer, token_for, TestContext},
    mocks::rejecting_gateway,
};
use crate::data_objects::{ReleaseResponse, SweepSummary};

fn release_request(order_id: &str) -> TestRequest {
    TestRequest::post().uri(&format!("/api/orders/{order_id}/release")).insert_header(bearer(&admin_token()))
}

#[actix_web::test]
async fn manual_release_pays_the_seller_once() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-1", "seller-1").await;
    ctx.manual_payout_seller("seller-1").await;

    let (status, body) = ctx.request(release_request("ord-1")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let first: ReleaseResponse = serde_json::from_str(&body).unwrap();
    assert!(!first.already_released);
    assert_eq!(first.method, Some(PayoutMethod::Manual));
    let reference = first.reference.clone().unwrap();
    assert!(reference.starts_with("MANUAL-ord-1-"));
    assert_eq!(first.seller_amount, Money::from(95));
    assert_eq!(first.commission.as_ref().unwrap().amount, Money::from(5));

    // A second click is harmless, and reports the original payout
    let (status, body) = ctx.request(release_request("ord-1")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let second: ReleaseResponse = serde_json::from_str(&body).unwrap();
    assert!(second.already_released);
    assert_eq!(second.reference, Some(reference));
    assert_eq!(second.commission.unwrap().amount, Money::from(5));

    let order = ctx.fetch_order("ord-1").await;
    assert_eq!(order.payment_status, PaymentStatus::Released);
    assert_eq!(order.release_trigger, Some(ReleaseTrigger::Manual));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn releasing_an_unknown_order() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    let (status, body) = ctx.request(release_request("nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Order #nope does not exist"), "{body}");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn seller_without_payout_details() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-2", "seller-2").await;
    let (status, body) = ctx.request(release_request("ord-2")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("seller-2"), "{body}");
    assert_eq!(ctx.fetch_order("ord-2").await.payment_status, PaymentStatus::Paid);

    // Once the seller adds their details, the admin can simply try again
    ctx.manual_payout_seller("seller-2").await;
    let (status, _) = ctx.request(release_request("ord-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.fetch_order("ord-2").await.payment_status, PaymentStatus::Released);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn release_already_under_way_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-4", "seller-4").await;
    ctx.manual_payout_seller("seller-4").await;
    // The sweep is paying this order out right now
    let claim = ReleaseClaim::new(Utc::now(), Duration::minutes(15));
    assert!(ctx.db.try_claim_release(&OrderId::from("ord-4"), &claim).await.unwrap());

    let (status, body) = ctx.request(release_request("ord-4")).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(body.contains("under way"), "{body}");
    assert!(!body.contains("already_released"));
    assert_eq!(ctx.fetch_order("ord-4").await.payment_status, PaymentStatus::Paid);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn provider_failure_is_a_bad_gateway() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::with_rails(PayoutRails::new().with_gateway(rejecting_gateway())).await;
    ctx.paid_order("ord-3", "seller-3").await;
    let profile = PayoutProfile::new("seller-3").with_mobile_money_a("08031234567");
    ctx.orders.set_payout_profile(profile).await.unwrap();

    let (status, body) = ctx.request(release_request("ord-3")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Insufficient balance"), "{body}");
    let order = ctx.fetch_order("ord-3").await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.transfer_reference.is_none());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn order_details_include_the_commission() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-5", "seller-5").await;
    ctx.manual_payout_seller("seller-5").await;
    let uri = "/api/orders/ord-5";

    let (status, body) = ctx.request(TestRequest::get().uri(uri).insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let details: OrderDetails = serde_json::from_str(&body).unwrap();
    assert!(details.commission.is_none());

    ctx.request(release_request("ord-5")).await;
    let (_, body) = ctx.request(TestRequest::get().uri(uri).insert_header(bearer(&admin_token()))).await;
    let details: OrderDetails = serde_json::from_str(&body).unwrap();
    assert_eq!(details.order.payment_status, PaymentStatus::Released);
    assert_eq!(details.commission.unwrap().amount, Money::from(5));

    let req = TestRequest::get().uri("/api/commission").insert_header(bearer(&admin_token()));
    let (status, body) = ctx.request(req).await;
    assert_eq!(status, StatusCode::OK);
    let total: serde_json::Value = serde_json::from_str(&body).unwrap();
    let total: Money = serde_json::from_value(total["total_commission"].clone()).unwrap();
    assert_eq!(total, Money::from(5));
    ctx.tear_down().await;
}

#[actix_web::test]
async fn sellers_mark_their_own_orders_delivered() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.paid_order("ord-6", "seller-6").await;
    let owner = token_for("seller-6", vec![Role::Seller]);
    let stranger = token_for("seller-7", vec![Role::Seller]);
    let uri = "/api/orders/ord-6/delivered";

    let (status, _) = ctx.request(TestRequest::post().uri(uri).insert_header(bearer(&stranger))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(ctx.fetch_order("ord-6").await.status, OrderStatusType::Pending);

    let before = Utc::now();
    let (status, body) = ctx.request(TestRequest::post().uri(uri).insert_header(bearer(&owner))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let order = ctx.fetch_order("ord-6").await;
    assert_eq!(order.status, OrderStatusType::Delivered);
    let delivered_at = order.delivered_at.unwrap();
    assert!(delivered_at >= before - Duration::seconds(1));
    assert_eq!(order.auto_release_date, Some(delivered_at + Duration::days(7)));

    // Delivery is recorded once
    let (status, _) = ctx.request(TestRequest::post().uri(uri).insert_header(bearer(&owner))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn sweep_route_releases_due_orders() {
    let _ = env_logger::try_init().ok();
    let ctx = TestContext::new().await;
    ctx.manual_payout_seller("seller-8").await;
    ctx.delivered_order("ord-due", "seller-8", Utc::now() - Duration::days(8)).await;
    ctx.delivered_order("ord-recent", "seller-8", Utc::now() - Duration::days(2)).await;
    ctx.delivered_order("ord-nobody", "seller-9", Utc::now() - Duration::days(9)).await;
    ctx.paid_order("ord-undelivered", "seller-8").await;

    let req = TestRequest::post().uri("/api/auto_release/run").insert_header(bearer(&admin_token()));
    let (status, body) = ctx.request(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let summary: SweepSummary = serde_json::from_str(&body).unwrap();
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.released, vec![OrderId::from("ord-due")]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].order_id, OrderId::from("ord-nobody"));
    assert_eq!(summary.not_yet_due, 1);

    let order = ctx.fetch_order("ord-due").await;
    assert_eq!(order.release_trigger, Some(ReleaseTrigger::Automatic));
    for id in ["ord-recent", "ord-nobody", "ord-undelivered"] {
        assert_eq!(ctx.fetch_order(id).await.payment_status, PaymentStatus::Paid, "{id}");
    }
    ctx.tear_down().await;
}

use actix_web::{body::to_bytes, http::StatusCode, test, test::TestRequest, web, App};
use chrono::{DateTime, Utc};
use escrow_common::Money;
use escrow_engine::{
    db_types::{NewOrder, Order, OrderId, PayoutProfile, Role},
    events::EventProducers,
    gateways::{ManualGateway, PayoutRails},
    test_utils::prepare_env::{prepare_test_env, random_db_path, tear_down},
    OrderFlowApi,
    PaymentReleaseApi,
    SqliteDatabase,
};
use log::debug;
use rust_decimal_macros::dec;

use crate::{
    auth::TokenIssuer,
    config::AuthConfig,
    middleware::AuthenticationMiddlewareFactory,
    routes::{
        health,
        MarkDeliveredRoute,
        MyPayoutProfileRoute,
        OrderByIdRoute,
        ReleaseOrderRoute,
        RunAutoReleaseRoute,
        TotalCommissionRoute,
        UpdatePayoutProfileRoute,
    },
};

// DO NOT re-use this secret anywhere.
pub const TEST_JWT_SECRET: &str = "endpoint-tests-only-8c1f0e5d";

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new(&AuthConfig::new(TEST_JWT_SECRET))
}

pub fn token_for(sub: &str, roles: Vec<Role>) -> String {
    issuer().issue_token(sub, roles, None).expect("Failed to sign token")
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub fn admin_token() -> String {
    token_for("admin-1", vec![Role::Admin])
}

pub struct TestContext {
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub release_api: PaymentReleaseApi<SqliteDatabase>,
}

impl TestContext {
    /// A fresh database, with only the manual payout rail available.
    pub async fn new() -> Self {
        Self::with_rails(PayoutRails::new().with_gateway(ManualGateway::new())).await
    }

    pub async fn with_rails(rails: PayoutRails) -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        let orders = OrderFlowApi::new(db.clone());
        let release_api = PaymentReleaseApi::new(db.clone(), rails, EventProducers::default());
        Self { db, orders, release_api }
    }

    pub async fn paid_order(&self, id: &str, seller: &str) -> Order {
        let order = NewOrder::new(OrderId::from(id), "buyer-1", seller, Money::from(100), dec!(0.05));
        self.orders.create_order(order).await.expect("Error creating order")
    }

    pub async fn delivered_order(&self, id: &str, seller: &str, delivered_at: DateTime<Utc>) -> Order {
        self.paid_order(id, seller).await;
        self.orders.mark_delivered_at(&OrderId::from(id), delivered_at).await.expect("Error marking delivered")
    }

    pub async fn manual_payout_seller(&self, seller: &str) -> PayoutProfile {
        let profile = PayoutProfile::new(seller).with_other_instructions("Collect cash at the student union");
        self.orders.set_payout_profile(profile).await.expect("Error saving payout profile")
    }

    pub async fn fetch_order(&self, id: &str) -> Order {
        self.orders.fetch_order(&OrderId::from(id)).await.expect("Order should exist")
    }

    /// Sends the request through the same middleware and routes as the real server. Errors raised by middleware are
    /// turned into responses, just as the server would.
    pub async fn request(&self, req: TestRequest) -> (StatusCode, String) {
        let auth_scope = web::scope("/api")
            .wrap(AuthenticationMiddlewareFactory::new(issuer()))
            .service(ReleaseOrderRoute::<SqliteDatabase>::new())
            .service(RunAutoReleaseRoute::<SqliteDatabase>::new())
            .service(MarkDeliveredRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(MyPayoutProfileRoute::<SqliteDatabase>::new())
            .service(UpdatePayoutProfileRoute::<SqliteDatabase>::new())
            .service(TotalCommissionRoute::<SqliteDatabase>::new());
        let app = App::new()
            .app_data(web::Data::new(self.orders.clone()))
            .app_data(web::Data::new(self.release_api.clone()))
            .service(health)
            .service(auth_scope);
        let service = test::init_service(app).await;
        debug!("Making request");
        match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                let body = test::read_body(res).await;
                (status, String::from_utf8_lossy(&body).into_owned())
            },
            Err(e) => {
                let res = e.error_response();
                let status = res.status();
                let body = to_bytes(res.into_body()).await.expect("Could not read error body");
                (status, String::from_utf8_lossy(&body).into_owned())
            },
        }
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}

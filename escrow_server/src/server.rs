use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use escrow_engine::{
    events::{EventHandlers, EventHooks, EventProducers, LogNotificationSink, ReleaseFailedEvent},
    gateways::{BankTransferGateway, PayoutRails},
    OrderFlowApi,
    PaymentReleaseApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    auth::TokenIssuer,
    auto_release_worker::AutoReleaseScheduler,
    config::ServerConfig,
    errors::ServerError,
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

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::StartupError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::StartupError(e.to_string()))?;
    let producers = start_event_handlers().await;
    let release_api = create_release_api(&config, db.clone(), producers)?;
    let scheduler = AutoReleaseScheduler::new(release_api.clone(), config.auto_release.interval);
    if config.auto_release.enabled {
        scheduler.start();
    } else {
        info!("🕰️ Auto-release scheduler is disabled");
    }
    let srv = create_server_instance(config, db, release_api)?;
    let result = srv.await.map_err(ServerError::from);
    scheduler.shutdown().await;
    result
}

/// Wires up the payout rails and the release engine. The bank rail is only available when it has been configured.
pub fn create_release_api(
    config: &ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<PaymentReleaseApi<SqliteDatabase>, ServerError> {
    let mut rails = PayoutRails::with_placeholder_rails(config.gateway_timeout);
    if let Some(bank) = &config.bank {
        let gateway = BankTransferGateway::new(bank.clone())
            .map_err(|e| ServerError::StartupError(format!("Could not configure bank transfers. {e}")))?;
        rails = rails.with_gateway(gateway);
    }
    info!("🏦 Payout rails available: {:?}", rails.methods());
    let api = PaymentReleaseApi::new(db, rails, producers)
        .with_claim_timeout(config.release_claim_timeout)
        .with_max_concurrent_releases(config.max_concurrent_releases);
    Ok(api)
}

/// Notifications go to the log until a real delivery channel is plugged in. Failed releases are raised as errors so
/// that an operator notices them.
async fn start_event_handlers() -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.deliver_notifications_to(Arc::new(LogNotificationSink)).on_release_failed(|ev: ReleaseFailedEvent| {
        Box::pin(async move {
            error!(
                "📬️ Payment release for order {} ({:?}) failed and needs attention. Seller: {}. {}",
                ev.order_id, ev.trigger, ev.seller_id, ev.reason
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    release_api: PaymentReleaseApi<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let issuer = TokenIssuer::new(&config.auth);
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("escrow::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(release_api.clone()));
        // Routes that require authentication
        let auth_scope = web::scope("/api")
            .wrap(AuthenticationMiddlewareFactory::new(issuer.clone()))
            .service(ReleaseOrderRoute::<SqliteDatabase>::new())
            .service(RunAutoReleaseRoute::<SqliteDatabase>::new())
            .service(MarkDeliveredRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(MyPayoutProfileRoute::<SqliteDatabase>::new())
            .service(UpdatePayoutProfileRoute::<SqliteDatabase>::new())
            .service(TotalCommissionRoute::<SqliteDatabase>::new());
        app.service(health).service(auth_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, payout calls etc.) should be
//! expressed as futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus
//! don’t block execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpResponse, Responder};
use escrow_engine::{
    db_types::{OrderId, ReleaseTrigger, Role},
    EscrowBackend,
    OrderFlowApi,
    PaymentReleaseApi,
    ReleaseError,
};
use log::*;
use serde_json::json;

use crate::{
    auth::JwtClaims,
    data_objects::{PayoutProfileRequest, ReleaseResponse, SweepSummary},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Release  ----------------------------------------------------
route!(release_order => Post "/orders/{order_id}/release" impl EscrowBackend where requires [Role::Admin]);
/// Route handler for manual payment releases.
///
/// Admins use this endpoint to pay the seller out before the automatic release date. The order must have been paid
/// and not yet released. If another release (an earlier request, or the auto-release sweep) got there first, the
/// response is still `200 OK`, with `already_released` set to true.
pub async fn release_order<B: EscrowBackend>(
    claims: JwtClaims,
    path: web::Path<String>,
    release_api: web::Data<PaymentReleaseApi<B>>,
    orders_api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    info!("💻️ {} requested a manual release for order {order_id}", claims.sub);
    match release_api.release(&order_id, ReleaseTrigger::Manual).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ReleaseResponse::from(result))),
        Err(ReleaseError::AlreadyReleased(id)) => {
            let details = orders_api.order_details(&id).await?;
            Ok(HttpResponse::Ok().json(ReleaseResponse::already_released(details.order, details.commission)))
        },
        Err(e) => {
            debug!("💻️ Manual release of {order_id} failed. {e}");
            Err(e.into())
        },
    }
}

route!(run_auto_release => Post "/auto_release/run" impl EscrowBackend where requires [Role::Admin]);
/// Runs the auto-release sweep immediately, instead of waiting for the next scheduled run. Returns a summary of what
/// the sweep did.
pub async fn run_auto_release<B: EscrowBackend>(
    claims: JwtClaims,
    api: web::Data<PaymentReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ {} triggered an auto-release sweep", claims.sub);
    let result = api.run_auto_release_sweep().await?;
    Ok(HttpResponse::Ok().json(SweepSummary::from(result)))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{order_id}" impl EscrowBackend where requires [Role::Admin]);
/// Fetches an order along with its commission record, if the payment has been released.
pub async fn order_by_id<B: EscrowBackend>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET order {order_id}");
    let details = api.order_details(&order_id).await?;
    Ok(HttpResponse::Ok().json(details))
}

route!(mark_delivered => Post "/orders/{order_id}/delivered" impl EscrowBackend where requires [Role::Seller]);
/// Sellers confirm delivery of their own orders here. This starts the hold period, after which the payment is
/// released automatically.
pub async fn mark_delivered<B: EscrowBackend>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ {} is marking order {order_id} as delivered", claims.sub);
    api.fetch_order_for_seller(&order_id, &claims.sub).await?;
    let order = api.mark_delivered(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payout profile  ----------------------------------------------------
route!(my_payout_profile => Get "/payout_profile" impl EscrowBackend where requires [Role::Seller]);
pub async fn my_payout_profile<B: EscrowBackend>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let profile = api
        .fetch_payout_profile(&claims.sub)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("No payout profile for {}", claims.sub)))?;
    Ok(HttpResponse::Ok().json(profile))
}

route!(update_payout_profile => Put "/payout_profile" impl EscrowBackend where requires [Role::Seller]);
/// Creates or replaces the caller's payout details. The profile always belongs to the seller named in the access
/// token.
pub async fn update_payout_profile<B: EscrowBackend>(
    claims: JwtClaims,
    body: web::Json<PayoutProfileRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ PUT payout profile for {}", claims.sub);
    let profile = body.into_inner().into_profile(&claims.sub);
    let saved = api.set_payout_profile(profile).await?;
    Ok(HttpResponse::Ok().json(saved))
}

//----------------------------------------------   Commission  ----------------------------------------------------
route!(total_commission => Get "/commission" impl EscrowBackend where requires [Role::Admin]);
pub async fn total_commission<B: EscrowBackend>(api: web::Data<OrderFlowApi<B>>) -> Result<HttpResponse, ServerError> {
    let total = api.total_commission().await?;
    Ok(HttpResponse::Ok().json(json!({ "total_commission": total })))
}

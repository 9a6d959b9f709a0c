//! Authentication middleware.
//!
//! Reads the bearer token from the `Authorization` header, validates it, and stores the resulting [`JwtClaims`] in
//! the request extensions. Requests without a valid token never reach the wrapped service.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::debug;

use crate::{
    auth::TokenIssuer,
    errors::{AuthError, ServerError},
};

pub struct AuthenticationMiddlewareFactory {
    issuer: Rc<TokenIssuer>,
}

impl AuthenticationMiddlewareFactory {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self { issuer: Rc::new(issuer) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticationMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticationMiddlewareService { issuer: Rc::clone(&self.issuer), service: Rc::new(service) })
    }
}

pub struct AuthenticationMiddlewareService<S> {
    issuer: Rc<TokenIssuer>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let issuer = Rc::clone(&self.issuer);
        Box::pin(async move {
            let token = bearer_token(&req)?;
            let claims = issuer.validate(&token).map_err(|e| {
                debug!("💻️ Rejected access token for {}. {e}", req.path());
                ServerError::from(e)
            })?;
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Result<String, ServerError> {
    let header = req.headers().get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected 'Bearer <token>'".to_string()).into())
}

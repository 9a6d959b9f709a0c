//! Access tokens.
//!
//! The server does not log users in itself. The marketplace's identity service issues HS256 access tokens signed with
//! the shared `ESC_JWT_SECRET`; this module validates them and exposes the claims to route handlers.
//! [`TokenIssuer::issue_token`] exists for operators and tests.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use escrow_engine::db_types::Role;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id. For sellers, this is also their seller id.
    pub sub: String,
    pub roles: Vec<Role>,
    /// Expiry, as a unix timestamp
    pub exp: usize,
}

impl JwtClaims {
    pub fn new<S: Into<String>>(sub: S, roles: Vec<Role>, lifetime: Duration) -> Self {
        let exp = (Utc::now() + lifetime).timestamp().max(0) as usize;
        Self { sub: sub.into(), roles, exp }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Handlers can take `JwtClaims` as an argument. The claims are put in place by
/// [`crate::middleware::AuthenticationMiddlewareFactory`], so this only works on authenticated scopes.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned().ok_or(AuthError::MissingToken).map_err(Into::into);
        ready(claims)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        let validation = Validation::new(Algorithm::HS256);
        Self { encoding_key: EncodingKey::from_secret(secret), decoding_key: DecodingKey::from_secret(secret), validation }
    }

    /// Issue a new access token for `sub` with the given roles. Tokens are valid for a day unless `lifetime` says
    /// otherwise, and will NOT refresh.
    pub fn issue_token(&self, sub: &str, roles: Vec<Role>, lifetime: Option<Duration>) -> Result<String, AuthError> {
        let lifetime = lifetime.unwrap_or_else(|| Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS));
        let claims = JwtClaims::new(sub, roles, lifetime);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Checks the token's signature and expiry, and returns its claims.
    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::PoorlyFormattedToken(e.to_string())
            },
            _ => AuthError::ValidationError(e.to_string()),
        })?;
        debug!("💻️ Access token validated for {}", data.claims.sub);
        Ok(data.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&AuthConfig::new("not-a-production-secret"))
    }

    #[test]
    fn issued_tokens_validate() {
        let issuer = issuer();
        let token = issuer.issue_token("admin-1", vec![Role::Admin], None).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.sub, "admin-1");
        assert!(claims.has_role(Role::Admin));
        assert!(!claims.has_role(Role::Seller));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let other = TokenIssuer::new(&AuthConfig::new("some-other-secret"));
        let token = other.issue_token("admin-1", vec![Role::Admin], None).unwrap();
        let err = issuer().validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer();
        let token = issuer.issue_token("seller-1", vec![Role::Seller], Some(Duration::hours(-1))).unwrap();
        let err = issuer.validate(&token).unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[test]
    fn garbage_is_poorly_formatted() {
        let err = issuer().validate("not.a.token").unwrap_err();
        assert!(matches!(err, AuthError::PoorlyFormattedToken(_)));
    }
}

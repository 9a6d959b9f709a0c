use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use escrow_engine::{OrderFlowError, ReleaseError};
use log::error;
use thiserror::Error;

/// Everything a request handler can fail with. Each variant maps onto exactly one HTTP status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("The escrow server failed to start. {0}")]
    StartupError(String),
    #[error("The escrow backend reported an error. {0}")]
    BackendError(String),
    #[error("Bad request. {0}")]
    InvalidRequest(String),
    #[error("Network or file system error. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The server is misconfigured. {0}")]
    ConfigurationError(String),
    #[error("{0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("The request could not be completed. {0}")]
    Conflict(String),
    #[error("The payout provider could not complete the transfer. {0}")]
    PayoutFailed(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        use ServerError::*;
        match self {
            InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthenticationError(AuthError::MissingToken | AuthError::ValidationError(_)) => StatusCode::UNAUTHORIZED,
            AuthenticationError(AuthError::PoorlyFormattedToken(_)) => StatusCode::BAD_REQUEST,
            AuthenticationError(AuthError::InsufficientPermissions(_)) => StatusCode::FORBIDDEN,
            AuthenticationError(AuthError::SigningError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) => StatusCode::CONFLICT,
            PayoutFailed(_) => StatusCode::BAD_GATEWAY,
            StartupError(_) | BackendError(_) | IOError(_) | ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        HttpResponse::build(status).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided. Supply one in the Authorization header as a bearer token.")]
    MissingToken,
    #[error("Access denied. {0}")]
    InsufficientPermissions(String),
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Could not sign access token. {0}")]
    SigningError(String),
}

impl From<ReleaseError> for ServerError {
    fn from(e: ReleaseError) -> Self {
        match e {
            ReleaseError::OrderNotFound(_) => Self::NotFound(e.to_string()),
            ReleaseError::NotEligible(_) => Self::InvalidRequest(e.to_string()),
            ReleaseError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            ReleaseError::AlreadyReleased(_) => Self::Conflict(e.to_string()),
            ReleaseError::ReleaseInProgress(_) => Self::Conflict(e.to_string()),
            ReleaseError::NoPayoutChannel(_) => Self::Conflict(e.to_string()),
            ReleaseError::TransferFailed(_) => Self::PayoutFailed(e.to_string()),
            ReleaseError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::OrderNotFound(_) => Self::NotFound(e.to_string()),
            // Sellers only ever learn that the order isn't there
            OrderFlowError::NotOrderOwner(id) => Self::NotFound(OrderFlowError::OrderNotFound(id).to_string()),
            OrderFlowError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            OrderFlowError::InvalidOrder(_) => Self::InvalidRequest(e.to_string()),
            OrderFlowError::InvalidPayoutProfile(_) => Self::InvalidRequest(e.to_string()),
            OrderFlowError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

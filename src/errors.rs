use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Unified service error taxonomy. Guard failures (`InvalidTransition`,
/// `AlreadyProcessed`, `ApprovalRequired`) are expected business outcomes and
/// travel as typed results all the way to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cart is empty: no resolvable items to quote")]
    EmptyCart,

    #[error("Invalid transition: cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("This quote has already been processed (current status: {0})")]
    AlreadyProcessed(String),

    #[error("Approval required: proforma is '{0}', only approved quotes convert to orders")]
    ApprovalRequired(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("Payment provider timed out")]
    PaymentProviderTimeout,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EmptyCart | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition { .. } | Self::AlreadyProcessed(_) | Self::ApprovalRequired(_) => {
                StatusCode::CONFLICT
            }
            Self::PaymentProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::PaymentProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Message suitable for HTTP responses. Storage and wrapped internal
    /// errors are logged server-side with full context and rendered
    /// generically here.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::PaymentProviderUnavailable(_) => "Payment provider unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Unauthorized("not yours".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::AlreadyProcessed("approved".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ApprovalRequired("pending".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::PaymentProviderTimeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = ServiceError::InvalidTransition {
            from: "dispatched".into(),
            to: "cancelled".into(),
        };
        let msg = err.response_message();
        assert!(msg.contains("dispatched"));
        assert!(msg.contains("cancelled"));
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom(
            "connection string with secrets".into(),
        ));
        assert_eq!(err.response_message(), "Internal server error");
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("request is not accepting offers")]
    RequestNotAcceptingOffers,

    #[error("offer is not open")]
    OfferNotOpen,

    #[error("caller does not own this request")]
    NotRequestOwner,

    #[error("an offer has already been accepted for this request")]
    AlreadyAccepted,

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("actor is not authorized for this transition")]
    UnauthorizedActor,

    #[error("cancellation window has closed")]
    CancellationWindowClosed,

    #[error("payment has not been confirmed by the gateway")]
    PaymentNotConfirmed,

    #[error("no receipt has been submitted for this trip")]
    MissingReceipt,

    #[error("confirmation code does not match")]
    InvalidConfirmationCode,

    #[error("confirmation code has already been used")]
    CodeAlreadyUsed,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Infrastructure failures leave no partial writes, so the caller may
    /// always retry them as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Unavailable(_))
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotRequestOwner | DispatchError::UnauthorizedActor => {
                StatusCode::FORBIDDEN
            }
            DispatchError::RequestNotAcceptingOffers
            | DispatchError::OfferNotOpen
            | DispatchError::AlreadyAccepted
            | DispatchError::IllegalTransition { .. }
            | DispatchError::CancellationWindowClosed
            | DispatchError::PaymentNotConfirmed
            | DispatchError::MissingReceipt
            | DispatchError::CodeAlreadyUsed => StatusCode::CONFLICT,
            DispatchError::InvalidConfirmationCode => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchError;

    #[test]
    fn only_infrastructure_errors_are_retryable() {
        assert!(DispatchError::Unavailable("store timeout".to_string()).is_retryable());
        assert!(!DispatchError::AlreadyAccepted.is_retryable());
        assert!(!DispatchError::InvalidConfirmationCode.is_retryable());
    }
}

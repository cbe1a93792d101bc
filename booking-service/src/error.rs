use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::Serialize;
use shared::PricingError;
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, format!("{} is required", field))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid booking request: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("check-out date {check_out} must be after check-in date {check_in}")]
    InvalidDateRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("payment gateway error: {0}")]
    PaymentGateway(#[source] GatewayError),

    #[error("reservation {reservation_id} could not be rolled back after gateway failure: {source}")]
    CompensationFailed {
        reservation_id: Uuid,
        gateway: GatewayError,
        #[source]
        source: StoreError,
    },

    #[error("reservation {0} not found")]
    NotFound(Uuid),

    #[error("pricing error: {0}")]
    Pricing(PricingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<PricingError> for BookingError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidDateRange { check_in, check_out } => {
                BookingError::InvalidDateRange { check_in, check_out }
            }
            PricingError::Overflow { .. } => BookingError::Validation(vec![FieldError::new(
                "checkOut",
                "stay is too long to be priced",
            )]),
            other => BookingError::Pricing(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) | BookingError::InvalidDateRange { .. } => StatusCode::BAD_REQUEST,
            BookingError::RoomNotFound(_) | BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            BookingError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::CompensationFailed { .. }
            | BookingError::Pricing(_)
            | BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Booking request failed");
        }
        let body = match self {
            BookingError::Validation(errors) => ErrorResponse {
                message: "Missing or invalid booking information".to_string(),
                errors,
            },
            BookingError::RoomNotFound(key) => ErrorResponse::new(format!("Room not found: {}", key)),
            BookingError::InvalidDateRange { .. } => {
                ErrorResponse::new("Check-out date must be after check-in date")
            }
            BookingError::NotFound(_) => ErrorResponse::new("Booking not found"),
            BookingError::PaymentGateway(_) => {
                ErrorResponse::new("Failed to create payment invoice. Please try again.")
            }
            BookingError::Store(StoreError::Unavailable(_)) => {
                ErrorResponse::new("Booking service is temporarily unavailable. Please try again.")
            }
            BookingError::CompensationFailed { .. } | BookingError::Pricing(_) | BookingError::Store(_) => {
                ErrorResponse::new("Internal Server Error")
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook callback token rejected")]
    Unauthorized,

    #[error("reservation store unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Unauthorized webhook")),
            )
                .into_response(),
            WebhookError::Unavailable(err) => {
                tracing::error!(error = %err, "Webhook could not reach the reservation store");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse::new("Webhook processing failed")),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_errors_map_to_http_status() {
        let validation = BookingError::Validation(vec![FieldError::missing("booker.email")]);
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.to_string(), "invalid booking request: booker.email");

        assert_eq!(
            BookingError::RoomNotFound("penthouse".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BookingError::PaymentGateway(GatewayError::Timeout).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BookingError::Store(StoreError::Unavailable("pool closed".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn inverted_dates_from_pricing_keep_their_kind() {
        let check_in = NaiveDate::from_ymd_opt(2025, 11, 22).unwrap();
        let check_out = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        let err = BookingError::from(PricingError::InvalidDateRange { check_in, check_out });
        assert!(matches!(err, BookingError::InvalidDateRange { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}

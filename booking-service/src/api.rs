use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{Amount, Reservation, ReservationStatus};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{BookingError, FieldError, WebhookError};
use crate::orchestrator::{advisory_amount, BookerDetails, BookingOrchestrator, BookingRequest};
use crate::reconciler::{WebhookReconciler, CALLBACK_TOKEN_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub reconciler: Arc<WebhookReconciler>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    pub success: bool,
    pub booking_id: Uuid,
    pub invoice_url: String,
    pub invoice_id: String,
    pub message: String,
}

/// Customer-facing projection of a reservation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Uuid,
    pub room_slug: String,
    pub room_name: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub duration: u32,
    pub adults: u32,
    pub children: u32,
    pub base_price: Amount,
    pub service_fee: Amount,
    pub tourism_tax: Amount,
    pub total_price: Amount,
    pub status: ReservationStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub special_request: Option<String>,
    pub invoice_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for BookingView {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id,
            room_slug: reservation.room.slug,
            room_name: reservation.room.name,
            check_in_date: reservation.check_in,
            check_out_date: reservation.check_out,
            duration: reservation.price.duration,
            adults: reservation.guests.adults,
            children: reservation.guests.children,
            base_price: reservation.price.base_price,
            service_fee: reservation.price.service_fee,
            tourism_tax: reservation.price.tourism_tax,
            total_price: reservation.price.total,
            status: reservation.status,
            customer_name: reservation.customer.name,
            customer_email: reservation.customer.email,
            customer_phone: reservation.customer.phone,
            special_request: reservation.special_request,
            invoice_url: reservation.invoice.map(|i| i.invoice_url),
            paid_at: reservation.payment.and_then(|p| p.paid_at),
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingStatusResponse {
    pub success: bool,
    pub booking: BookingView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub booking_id: Option<String>,
}

/// Payment form posted by the older checkout page.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentRequest {
    pub booking_details: Option<LegacyBookingDetails>,
    pub billing_details: Option<LegacyBillingDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBookingDetails {
    pub room: Option<LegacyRoom>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    #[serde(default, deserialize_with = "advisory_amount")]
    pub total: Option<Amount>,
}

/// Only the identity is read; the catalog price wins over `price`. Older
/// clients send just `name`, which is matched as a slug.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyRoom {
    pub id: Option<serde_json::Value>,
    pub slug: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBillingDetails {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentResponse {
    pub invoice_url: String,
}

impl LegacyRoom {
    fn key(self) -> Option<String> {
        let id = match self.id {
            Some(serde_json::Value::String(id)) => Some(id),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let slug_from_name = self.name.map(|name| {
            name.split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join("-")
        });
        self.slug.or(id).or(slug_from_name)
    }
}

impl TryFrom<LegacyPaymentRequest> for BookingRequest {
    type Error = BookingError;

    fn try_from(legacy: LegacyPaymentRequest) -> Result<Self, Self::Error> {
        let (booking, billing) = match (legacy.booking_details, legacy.billing_details) {
            (Some(booking), Some(billing)) => (booking, billing),
            (booking, billing) => {
                let mut errors = Vec::new();
                if booking.is_none() {
                    errors.push(FieldError::missing("bookingDetails"));
                }
                if billing.is_none() {
                    errors.push(FieldError::missing("billingDetails"));
                }
                return Err(BookingError::Validation(errors));
            }
        };

        Ok(BookingRequest {
            room_slug: booking.room.and_then(LegacyRoom::key),
            check_in: booking.check_in,
            check_out: booking.check_out,
            adults: booking.adults,
            children: booking.children,
            booker: Some(BookerDetails {
                name: billing.full_name,
                email: billing.email,
                phone: billing.phone,
                ..BookerDetails::default()
            }),
            special_request: None,
            total_amount: booking.total,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/booking", post(create_booking).get(booking_status_query))
        .route("/api/booking/:id", get(booking_status))
        .route("/api/payment", post(create_booking).get(booking_status_query))
        .route("/api/create-payment", post(create_legacy_payment))
        .route("/api/webhook", post(payment_webhook))
        .route("/api/webhook/xendit", post(payment_webhook))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<CreateBookingResponse>, BookingError> {
    let confirmation = state.orchestrator.create_booking(request).await?;

    Ok(Json(CreateBookingResponse {
        success: true,
        booking_id: confirmation.reservation.id,
        invoice_url: confirmation.invoice.invoice_url,
        invoice_id: confirmation.invoice.invoice_id,
        message: "Booking created successfully. Redirecting to payment...".to_string(),
    }))
}

pub async fn create_legacy_payment(
    State(state): State<AppState>,
    Json(request): Json<LegacyPaymentRequest>,
) -> Result<Json<LegacyPaymentResponse>, BookingError> {
    let confirmation = state.orchestrator.create_booking(request.try_into()?).await?;

    Ok(Json(LegacyPaymentResponse {
        invoice_url: confirmation.invoice.invoice_url,
    }))
}

pub async fn booking_status_query(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<BookingStatusResponse>, BookingError> {
    let raw = query
        .booking_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| BookingError::Validation(vec![FieldError::missing("bookingId")]))?;
    lookup(&state, &raw).await
}

pub async fn booking_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingStatusResponse>, BookingError> {
    lookup(&state, &id).await
}

async fn lookup(state: &AppState, raw: &str) -> Result<Json<BookingStatusResponse>, BookingError> {
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| BookingError::Validation(vec![FieldError::new("bookingId", "must be a booking id")]))?;
    let reservation = state.orchestrator.booking_status(id).await?;

    Ok(Json(BookingStatusResponse {
        success: true,
        booking: reservation.into(),
    }))
}

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, WebhookError> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.reconciler.handle(token, &body).await?;
    tracing::debug!(?outcome, "Payment callback acknowledged");

    Ok(Json(serde_json::json!({ "received": true })))
}

pub async fn health_check() -> &'static str {
    "OK"
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer};
use shared::pricing::{DEFAULT_PRICE_TOLERANCE, DEFAULT_TOURISM_TAX_PER_NIGHT};
use shared::{
    Amount, Customer, Guests, InvoiceRef, NewReservation, PriceBreakdown, PricingPolicy, Reservation,
    ReservationPatch, Room,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::RoomCatalog;
use crate::error::{BookingError, FieldError};
use crate::gateway::{GatewayError, InvoiceGateway, InvoiceItem, InvoiceRequest};
use crate::store::{self, ReservationStore, StoreError};

/// Per-field cap on guest counts.
pub const MAX_GUESTS: u32 = 20;

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub public_url: String,
    pub tourism_tax_per_night: Amount,
    pub price_tolerance: Amount,
    pub invoice_attempts: u32,
    pub gateway_timeout: Duration,
    pub store_timeout: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".to_string(),
            tourism_tax_per_night: DEFAULT_TOURISM_TAX_PER_NIGHT,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            invoice_attempts: 2,
            gateway_timeout: Duration::from_secs(15),
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

/// Inbound booking form. Everything is optional here so that validation can
/// report every missing field at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(alias = "roomId")]
    pub room_slug: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub booker: Option<BookerDetails>,
    pub special_request: Option<String>,
    /// Total the client computed earlier in its flow. Advisory only.
    #[serde(default, deserialize_with = "advisory_amount")]
    pub total_amount: Option<Amount>,
}

pub(crate) fn advisory_amount<'de, D>(deserializer: D) -> Result<Option<Amount>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidBooking {
    room_key: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: Guests,
    customer: Customer,
    special_request: Option<String>,
    client_total: Option<Amount>,
}

#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub reservation: Reservation,
    pub invoice: InvoiceRef,
    /// `client total - server total` when it exceeded the tolerance.
    pub price_discrepancy: Option<Amount>,
}

pub struct BookingOrchestrator {
    store: Arc<dyn ReservationStore>,
    gateway: Arc<dyn InvoiceGateway>,
    catalog: Arc<dyn RoomCatalog>,
    pricing: PricingPolicy,
    settings: BookingSettings,
}

impl BookingOrchestrator {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        gateway: Arc<dyn InvoiceGateway>,
        catalog: Arc<dyn RoomCatalog>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            catalog,
            pricing: PricingPolicy::new(settings.tourism_tax_per_night),
            settings,
        }
    }

    pub async fn create_booking(&self, request: BookingRequest) -> Result<BookingConfirmation, BookingError> {
        let booking = validate(request)?;

        let room = self
            .catalog
            .find(&booking.room_key)
            .ok_or_else(|| BookingError::RoomNotFound(booking.room_key.clone()))?;

        let price = self.pricing.quote(room.price_per_night, booking.check_in, booking.check_out)?;
        let price_discrepancy = self.cross_check(&room, &price, booking.client_total);

        let reservation = self
            .bounded(self.store.create(NewReservation {
                room,
                check_in: booking.check_in,
                check_out: booking.check_out,
                guests: booking.guests,
                price,
                customer: booking.customer,
                special_request: booking.special_request,
            }))
            .await?;
        info!(
            reservation_id = %reservation.id,
            room = %reservation.room.slug,
            total = reservation.price.total,
            "Reservation created, requesting invoice"
        );

        let invoice_request = self.invoice_request(&reservation);
        let invoice = match self.request_invoice(&invoice_request).await {
            Ok(invoice) => invoice,
            Err(gateway_error) => return Err(self.compensate(reservation.id, gateway_error).await),
        };

        let patch = ReservationPatch::attach_invoice(invoice.clone());
        let reservation = match self.bounded(self.store.update(reservation.id, patch)).await {
            Ok(updated) => updated,
            Err(e) => {
                // The invoice is keyed by reservation id, so callbacks still reconcile.
                warn!(
                    reservation_id = %reservation.id,
                    invoice_id = %invoice.invoice_id,
                    "Failed to attach invoice to reservation: {}", e
                );
                Reservation {
                    invoice: Some(invoice.clone()),
                    ..reservation
                }
            }
        };

        info!(
            reservation_id = %reservation.id,
            invoice_id = %invoice.invoice_id,
            "Booking ready for payment"
        );
        Ok(BookingConfirmation {
            reservation,
            invoice,
            price_discrepancy,
        })
    }

    pub async fn booking_status(&self, id: Uuid) -> Result<Reservation, BookingError> {
        match self.bounded(self.store.get(id)).await {
            Ok(reservation) => Ok(reservation),
            Err(StoreError::NotFound(id)) => Err(BookingError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn cross_check(&self, room: &Room, price: &PriceBreakdown, client_total: Option<Amount>) -> Option<Amount> {
        let received = client_total?;
        let difference = received.saturating_sub(price.total);
        if difference.unsigned_abs() > self.settings.price_tolerance.unsigned_abs() {
            warn!(
                room = %room.slug,
                calculated = price.total,
                received,
                difference,
                "Price mismatch between client and server totals"
            );
            Some(difference)
        } else {
            None
        }
    }

    fn invoice_request(&self, reservation: &Reservation) -> InvoiceRequest {
        let price = &reservation.price;
        let nights = price.duration;
        let items = vec![
            InvoiceItem {
                name: format!("{} - {} nights", reservation.room.name, nights),
                quantity: 1,
                price: price.base_price,
                category: "Accommodation".to_string(),
            },
            InvoiceItem {
                name: "Service Fee (5%)".to_string(),
                quantity: 1,
                price: price.service_fee,
                category: "Fee".to_string(),
            },
            InvoiceItem {
                name: "Tourism Tax".to_string(),
                quantity: nights,
                price: price.tourism_tax_per_night,
                category: "Tax".to_string(),
            },
        ];

        InvoiceRequest {
            external_reference: reservation.id,
            amount: price.total,
            payer_email: reservation.customer.email.clone(),
            description: format!(
                "Booking for {} at Tembi Cultural House from {} to {} ({} nights)",
                reservation.room.name,
                reservation.check_in.format("%-d %b %Y"),
                reservation.check_out.format("%-d %b %Y"),
                nights
            ),
            items,
            success_url: format!("{}/booking/success?booking_id={}", self.settings.public_url, reservation.id),
            failure_url: format!("{}/booking/failed?booking_id={}", self.settings.public_url, reservation.id),
            customer: reservation.customer.clone(),
        }
    }

    async fn request_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceRef, GatewayError> {
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(self.settings.gateway_timeout, self.gateway.create_invoice(request))
                .await
                .unwrap_or(Err(GatewayError::Timeout));

            match result {
                Err(e) if e.is_retryable() && attempt < self.settings.invoice_attempts => {
                    warn!(
                        reservation_id = %request.external_reference,
                        attempt,
                        "Invoice request did not reach gateway, retrying: {}", e
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn compensate(&self, id: Uuid, gateway_error: GatewayError) -> BookingError {
        error!(reservation_id = %id, "Xendit invoice creation failed: {}", gateway_error);

        match self.bounded(self.store.delete(id)).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                info!(reservation_id = %id, "Reservation rolled back");
                BookingError::PaymentGateway(gateway_error)
            }
            Err(source) => {
                error!(
                    reservation_id = %id,
                    "Rollback failed, reservation left PENDING without invoice: {}", source
                );
                BookingError::CompensationFailed {
                    reservation_id: id,
                    gateway: gateway_error,
                    source,
                }
            }
        }
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        store::within(self.settings.store_timeout, operation).await
    }
}

fn validate(request: BookingRequest) -> Result<ValidBooking, BookingError> {
    let mut errors = Vec::new();

    let room_key = required(&mut errors, "roomSlug", request.room_slug);
    let check_in = required(&mut errors, "checkIn", request.check_in).and_then(|raw| date(&mut errors, "checkIn", &raw));
    let check_out =
        required(&mut errors, "checkOut", request.check_out).and_then(|raw| date(&mut errors, "checkOut", &raw));

    let booker = request.booker.unwrap_or_default();
    let name = required(&mut errors, "booker.name", booker.name);
    let phone = required(&mut errors, "booker.phone", booker.phone);
    let email = required(&mut errors, "booker.email", booker.email);
    if let Some(email) = &email {
        if !looks_like_email(email) {
            errors.push(FieldError::new("booker.email", "must be a valid email address"));
        }
    }

    let adults = request.adults.unwrap_or(1);
    if adults == 0 {
        errors.push(FieldError::new("adults", "at least one adult is required"));
    } else if adults > MAX_GUESTS {
        errors.push(FieldError::new("adults", format!("at most {} adults per booking", MAX_GUESTS)));
    }
    let children = request.children.unwrap_or(0);
    if children > MAX_GUESTS {
        errors.push(FieldError::new("children", format!("at most {} children per booking", MAX_GUESTS)));
    }

    match (room_key, check_in, check_out, name, email, phone) {
        (Some(room_key), Some(check_in), Some(check_out), Some(name), Some(email), Some(phone))
            if errors.is_empty() =>
        {
            Ok(ValidBooking {
                room_key,
                check_in,
                check_out,
                guests: Guests { adults, children },
                customer: Customer {
                    name,
                    email,
                    phone,
                    address: optional(booker.address),
                    city: optional(booker.city),
                    postal_code: optional(booker.postal_code),
                },
                special_request: optional(request.special_request),
                client_total: request.total_amount,
            })
        }
        _ => Err(BookingError::Validation(errors)),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(errors: &mut Vec<FieldError>, field: &str, value: Option<String>) -> Option<String> {
    let value = optional(value);
    if value.is_none() {
        errors.push(FieldError::missing(field));
    }
    value
}

fn date(errors: &mut Vec<FieldError>, field: &str, raw: &str) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()));
    if parsed.is_none() {
        errors.push(FieldError::new(field, "must be a date (YYYY-MM-DD)"));
    }
    parsed
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.starts_with('.') && domain.contains('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

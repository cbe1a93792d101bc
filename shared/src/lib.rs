use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

pub mod pricing;

pub use pricing::{PriceBreakdown, PricingError, PricingPolicy};

/// Whole units of the booking currency.
pub type Amount = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub price_per_night: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Paid,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Paid => "PAID",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Paid | ReservationStatus::Expired)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Paid)
                | (ReservationStatus::Pending, ReservationStatus::Expired)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reservation status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "PAID" => Ok(ReservationStatus::Paid),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guests {
    pub adults: u32,
    pub children: u32,
}

impl Default for Guests {
    fn default() -> Self {
        Self { adults: 1, children: 0 }
    }
}

/// Handle on the invoice the payment provider issued for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub invoice_id: String,
    pub invoice_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub paid_at: Option<DateTime<Utc>>,
    pub method: Option<String>,
}

/// Everything the store needs to persist a fresh reservation. The room
/// price is a snapshot taken at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub room: Room,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: Guests,
    pub price: PriceBreakdown,
    pub customer: Customer,
    pub special_request: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub room: Room,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: Guests,
    pub price: PriceBreakdown,
    pub customer: Customer,
    pub special_request: Option<String>,
    pub invoice: Option<InvoiceRef>,
    pub status: ReservationStatus,
    pub payment: Option<PaymentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(data: NewReservation) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            room: data.room,
            check_in: data.check_in,
            check_out: data.check_out,
            guests: data.guests,
            price: data.price,
            customer: data.customer,
            special_request: data.special_request,
            invoice: None,
            status: ReservationStatus::Pending,
            payment: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. Status and the price snapshot are not patchable;
/// status only moves through a guarded transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub invoice: Option<InvoiceRef>,
    pub special_request: Option<String>,
}

impl ReservationPatch {
    pub fn attach_invoice(invoice: InvoiceRef) -> Self {
        Self {
            invoice: Some(invoice),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEventType {
    ReservationPaid,
    ReservationExpired,
}

impl ReservationEventType {
    pub fn for_status(status: ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Paid => Some(ReservationEventType::ReservationPaid),
            ReservationStatus::Expired => Some(ReservationEventType::ReservationExpired),
            ReservationStatus::Pending => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationEventType::ReservationPaid => "ReservationPaid",
            ReservationEventType::ReservationExpired => "ReservationExpired",
        }
    }
}

/// Payload published for downstream consumers (guest confirmation mail,
/// front-desk notification) once a reservation settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub reservation_id: Uuid,
    pub event_type: ReservationEventType,
    pub status: ReservationStatus,
    pub room_slug: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total: Amount,
    pub customer_name: String,
    pub customer_email: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReservationEvent {
    pub fn settled(reservation: &Reservation) -> Option<Self> {
        let event_type = ReservationEventType::for_status(reservation.status)?;
        let payment = reservation.payment.clone().unwrap_or_default();
        Some(Self {
            reservation_id: reservation.id,
            event_type,
            status: reservation.status,
            room_slug: reservation.room.slug.clone(),
            check_in: reservation.check_in,
            check_out: reservation.check_out,
            total: reservation.price.total,
            customer_name: reservation.customer.name.clone(),
            customer_email: reservation.customer.email.clone(),
            paid_at: payment.paid_at,
            payment_method: payment.method,
            occurred_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    pub fn new(event: &ReservationEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: event.reservation_id,
            event_type: event.event_type.as_str().to_string(),
            event_data: serde_json::to_value(event)?,
            created_at: Utc::now(),
        })
    }
}

use anyhow::{anyhow, Context};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct ReservationRow {
    pub id: Uuid,
    pub room_id: i64,
    pub room_slug: String,
    pub room_name: String,
    pub room_price: BigDecimal,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub duration: i32,
    pub adults: i32,
    pub children: i32,
    pub base_price: BigDecimal,
    pub service_fee: BigDecimal,
    pub tourism_tax_per_night: BigDecimal,
    pub tourism_tax: BigDecimal,
    pub total_price: BigDecimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: Option<String>,
    pub customer_city: Option<String>,
    pub customer_postal_code: Option<String>,
    pub special_request: Option<String>,
    pub invoice_id: Option<String>,
    pub invoice_url: Option<String>,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservationRow {
    pub id: Uuid,
    pub room_id: i64,
    pub room_slug: String,
    pub room_name: String,
    pub room_price: BigDecimal,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub duration: i32,
    pub adults: i32,
    pub children: i32,
    pub base_price: BigDecimal,
    pub service_fee: BigDecimal,
    pub tourism_tax_per_night: BigDecimal,
    pub tourism_tax: BigDecimal,
    pub total_price: BigDecimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: Option<String>,
    pub customer_city: Option<String>,
    pub customer_postal_code: Option<String>,
    pub special_request: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `None` fields are left untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::reservations)]
pub struct ReservationChangeset {
    pub invoice_id: Option<String>,
    pub invoice_url: Option<String>,
    pub special_request: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Pending relay row; deleted once published.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxEvent> for DbOutboxEvent {
    fn from(event: OutboxEvent) -> Self {
        Self {
            id: event.id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type,
            event_data: event.event_data,
            created_at: event.created_at,
        }
    }
}

impl From<ReservationPatch> for ReservationChangeset {
    fn from(patch: ReservationPatch) -> Self {
        let (invoice_id, invoice_url) = match patch.invoice {
            Some(invoice) => (Some(invoice.invoice_id), Some(invoice.invoice_url)),
            None => (None, None),
        };
        Self {
            invoice_id,
            invoice_url,
            special_request: patch.special_request,
            updated_at: Utc::now(),
        }
    }
}

fn count(value: u32, column: &str) -> anyhow::Result<i32> {
    i32::try_from(value).with_context(|| format!("{} out of range: {}", column, value))
}

fn amount(value: &BigDecimal, column: &str) -> anyhow::Result<Amount> {
    value
        .to_i64()
        .ok_or_else(|| anyhow!("{} is not a whole amount: {}", column, value))
}

impl TryFrom<&Reservation> for NewReservationRow {
    type Error = anyhow::Error;

    fn try_from(reservation: &Reservation) -> Result<Self, Self::Error> {
        let price = &reservation.price;
        let customer = reservation.customer.clone();
        Ok(Self {
            id: reservation.id,
            room_id: reservation.room.id,
            room_slug: reservation.room.slug.clone(),
            room_name: reservation.room.name.clone(),
            room_price: BigDecimal::from(reservation.room.price_per_night),
            check_in_date: reservation.check_in,
            check_out_date: reservation.check_out,
            duration: count(price.duration, "duration")?,
            adults: count(reservation.guests.adults, "adults")?,
            children: count(reservation.guests.children, "children")?,
            base_price: BigDecimal::from(price.base_price),
            service_fee: BigDecimal::from(price.service_fee),
            tourism_tax_per_night: BigDecimal::from(price.tourism_tax_per_night),
            tourism_tax: BigDecimal::from(price.tourism_tax),
            total_price: BigDecimal::from(price.total),
            customer_name: customer.name,
            customer_email: customer.email,
            customer_phone: customer.phone,
            customer_address: customer.address,
            customer_city: customer.city,
            customer_postal_code: customer.postal_code,
            special_request: reservation.special_request.clone(),
            status: reservation.status.as_str().to_string(),
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        })
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status: ReservationStatus = row.status.parse()?;
        let invoice = match (row.invoice_id, row.invoice_url) {
            (Some(invoice_id), Some(invoice_url)) => Some(InvoiceRef { invoice_id, invoice_url }),
            _ => None,
        };
        let payment = (status == ReservationStatus::Paid).then(|| PaymentRecord {
            paid_at: row.paid_at,
            method: row.payment_method,
        });

        Ok(Self {
            id: row.id,
            room: Room {
                id: row.room_id,
                slug: row.room_slug,
                name: row.room_name,
                price_per_night: amount(&row.room_price, "room_price")?,
            },
            check_in: row.check_in_date,
            check_out: row.check_out_date,
            guests: Guests {
                adults: u32::try_from(row.adults)?,
                children: u32::try_from(row.children)?,
            },
            price: PriceBreakdown {
                duration: u32::try_from(row.duration)?,
                room_price_per_night: amount(&row.room_price, "room_price")?,
                base_price: amount(&row.base_price, "base_price")?,
                service_fee: amount(&row.service_fee, "service_fee")?,
                tourism_tax_per_night: amount(&row.tourism_tax_per_night, "tourism_tax_per_night")?,
                tourism_tax: amount(&row.tourism_tax, "tourism_tax")?,
                total: amount(&row.total_price, "total_price")?,
            },
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
                address: row.customer_address,
                city: row.customer_city,
                postal_code: row.customer_postal_code,
            },
            special_request: row.special_request,
            invoice,
            status,
            payment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

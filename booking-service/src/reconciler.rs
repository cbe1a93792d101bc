use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shared::{PaymentRecord, ReservationStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::WebhookError;
use crate::store::{self, ReservationStore, StoreError};

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Expired,
    Other(String),
}

/// Payment callback normalized from either wire shape the provider sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub external_id: String,
    pub invoice_id: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotification {
    event: Option<String>,
    status: Option<String>,
    id: Option<String>,
    external_id: Option<String>,
    paid_at: Option<String>,
    payment_method: Option<String>,
    payment_channel: Option<String>,
    data: Option<Box<RawNotification>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("payload has no external_id")]
    MissingExternalId,
    #[error("payload has neither event nor status")]
    MissingStatus,
}

impl PaymentNotification {
    pub fn parse(body: &[u8]) -> Result<Self, NotificationError> {
        let raw: RawNotification = serde_json::from_slice(body).map_err(|e| NotificationError::Json(e.to_string()))?;
        let data = raw.data.map(|d| *d).unwrap_or_default();

        let status = match (raw.event, data.status.or(raw.status)) {
            (Some(event), _) => match event.as_str() {
                "invoices.paid" | "invoice.paid" => PaymentStatus::Paid,
                "invoices.expired" | "invoice.expired" => PaymentStatus::Expired,
                _ => PaymentStatus::Other(event),
            },
            (None, Some(status)) => match status.as_str() {
                "PAID" => PaymentStatus::Paid,
                "EXPIRED" => PaymentStatus::Expired,
                _ => PaymentStatus::Other(status),
            },
            (None, None) => return Err(NotificationError::MissingStatus),
        };

        let external_id = data
            .external_id
            .or(raw.external_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(NotificationError::MissingExternalId)?;

        let paid_at = data.paid_at.or(raw.paid_at).and_then(|ts| match DateTime::parse_from_rfc3339(&ts) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(external_id = %external_id, "Ignoring unparseable paid_at {:?}: {}", ts, e);
                None
            }
        });

        let payment_method = match (data.payment_method.or(raw.payment_method), data.payment_channel.or(raw.payment_channel)) {
            (Some(method), Some(channel)) => Some(format!("{} - {}", method, channel)),
            (method, channel) => method.or(channel),
        };

        Ok(Self {
            external_id,
            invoice_id: data.id.or(raw.id),
            status,
            paid_at,
            payment_method,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied {
        reservation_id: Uuid,
        status: ReservationStatus,
    },
    /// Redelivery of a transition that already happened.
    AlreadyApplied {
        reservation_id: Uuid,
        status: ReservationStatus,
    },
    /// The reservation already settled the other way.
    Conflict {
        reservation_id: Uuid,
        requested: ReservationStatus,
        current: Option<ReservationStatus>,
    },
    UnknownReservation {
        external_id: String,
    },
    Ignored {
        status: String,
    },
    Malformed {
        reason: String,
    },
}

pub struct WebhookReconciler {
    store: Arc<dyn ReservationStore>,
    verification_token: Option<String>,
    store_timeout: Duration,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn ReservationStore>, verification_token: Option<String>) -> Self {
        if verification_token.is_none() {
            warn!("No webhook verification token configured; payment callbacks are not authenticated");
        }
        Self {
            store,
            verification_token,
            store_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Every outcome except a rejected token or an unreachable store is an acknowledgement.
    pub async fn handle(&self, callback_token: Option<&str>, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        self.authenticate(callback_token)?;

        let notification = match PaymentNotification::parse(body) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Discarding malformed payment callback: {}", e);
                return Ok(WebhookOutcome::Malformed { reason: e.to_string() });
            }
        };

        self.apply(notification).await
    }

    fn authenticate(&self, presented: Option<&str>) -> Result<(), WebhookError> {
        let Some(expected) = self.verification_token.as_deref() else {
            warn!("Accepting unauthenticated payment callback");
            return Ok(());
        };
        let presented = presented.ok_or(WebhookError::Unauthorized)?;

        // Equal-length MAC tags compared in constant time, whatever the token lengths.
        let tag = |value: &str| -> Result<Vec<u8>, WebhookError> {
            let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).map_err(|_| WebhookError::Unauthorized)?;
            mac.update(value.as_bytes());
            Ok(mac.finalize().into_bytes().to_vec())
        };
        let expected_tag = tag(expected)?;

        let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).map_err(|_| WebhookError::Unauthorized)?;
        mac.update(presented.as_bytes());
        mac.verify_slice(&expected_tag).map_err(|_| {
            warn!("Rejected payment callback with invalid token");
            WebhookError::Unauthorized
        })
    }

    async fn apply(&self, notification: PaymentNotification) -> Result<WebhookOutcome, WebhookError> {
        let (target, payment) = match &notification.status {
            PaymentStatus::Paid => (
                ReservationStatus::Paid,
                Some(PaymentRecord {
                    paid_at: notification.paid_at,
                    method: notification.payment_method.clone(),
                }),
            ),
            PaymentStatus::Expired => (ReservationStatus::Expired, None),
            PaymentStatus::Other(status) => {
                info!(external_id = %notification.external_id, "Unhandled webhook event: {}", status);
                return Ok(WebhookOutcome::Ignored { status: status.clone() });
            }
        };

        let Ok(reservation_id) = Uuid::parse_str(&notification.external_id) else {
            warn!(external_id = %notification.external_id, "Payment callback for unknown reservation");
            return Ok(WebhookOutcome::UnknownReservation {
                external_id: notification.external_id,
            });
        };

        let result = store::within(
            self.store_timeout,
            self.store
                .transition(reservation_id, ReservationStatus::Pending, target, payment),
        )
        .await;

        match result {
            Ok(reservation) => {
                info!(
                    reservation_id = %reservation.id,
                    invoice_id = ?notification.invoice_id,
                    "Booking {} marked as {}", reservation.id, reservation.status
                );
                Ok(WebhookOutcome::Applied {
                    reservation_id,
                    status: reservation.status,
                })
            }
            Err(StoreError::NotFound(_)) => {
                warn!(%reservation_id, "Payment callback for unknown reservation");
                Ok(WebhookOutcome::UnknownReservation {
                    external_id: notification.external_id,
                })
            }
            Err(StoreError::InvalidTransition { current: Some(current), .. }) if current == target => {
                info!(%reservation_id, "Duplicate {} callback acknowledged", target);
                Ok(WebhookOutcome::AlreadyApplied {
                    reservation_id,
                    status: current,
                })
            }
            Err(StoreError::InvalidTransition { current, .. }) => {
                warn!(
                    %reservation_id,
                    requested = %target,
                    current = ?current,
                    "Ignoring payment callback that conflicts with settled reservation"
                );
                Ok(WebhookOutcome::Conflict {
                    reservation_id,
                    requested: target,
                    current,
                })
            }
            Err(StoreError::Finalized { status, .. }) => Ok(WebhookOutcome::Conflict {
                reservation_id,
                requested: target,
                current: Some(status),
            }),
            Err(e @ StoreError::Unavailable(_)) => Err(WebhookError::Unavailable(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_keyed_callback() {
        let body = br#"{
            "id": "579c8d61f23fa4ca35e52da4",
            "external_id": "2b0a5d5e-6a0b-4c3f-9e9a-1f0a2b3c4d5e",
            "status": "PAID",
            "paid_at": "2025-11-18T10:22:51.123Z",
            "payment_method": "BANK_TRANSFER",
            "payment_channel": "BCA"
        }"#;
        let notification = PaymentNotification::parse(body).unwrap();
        assert_eq!(notification.status, PaymentStatus::Paid);
        assert_eq!(notification.invoice_id.as_deref(), Some("579c8d61f23fa4ca35e52da4"));
        assert_eq!(notification.payment_method.as_deref(), Some("BANK_TRANSFER - BCA"));
        assert!(notification.paid_at.is_some());
    }

    #[test]
    fn parses_event_keyed_callback_with_nested_data() {
        let body = br#"{
            "event": "invoices.expired",
            "data": {"external_id": "abc", "status": "EXPIRED", "payment_channel": "OVO"}
        }"#;
        let notification = PaymentNotification::parse(body).unwrap();
        assert_eq!(notification.status, PaymentStatus::Expired);
        assert_eq!(notification.external_id, "abc");
        assert_eq!(notification.payment_method.as_deref(), Some("OVO"));
    }

    #[test]
    fn event_takes_precedence_over_status() {
        let body = br#"{"event": "invoices.refunded", "status": "PAID", "external_id": "abc"}"#;
        let notification = PaymentNotification::parse(body).unwrap();
        assert_eq!(notification.status, PaymentStatus::Other("invoices.refunded".to_string()));
    }

    #[test]
    fn rejects_payloads_missing_keys() {
        assert_eq!(
            PaymentNotification::parse(br#"{"status": "PAID"}"#),
            Err(NotificationError::MissingExternalId)
        );
        assert_eq!(
            PaymentNotification::parse(br#"{"external_id": "abc"}"#),
            Err(NotificationError::MissingStatus)
        );
        assert!(matches!(
            PaymentNotification::parse(b"not json"),
            Err(NotificationError::Json(_))
        ));
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use shared::{NewReservation, PaymentRecord, Reservation, ReservationPatch, ReservationStatus};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reservation {0} not found")]
    NotFound(Uuid),

    #[error("reservation {id} cannot move {from} -> {to} (stored status: {})", display_status(.current))]
    InvalidTransition {
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        current: Option<ReservationStatus>,
    },

    #[error("reservation {id} is {status} and can no longer be removed")]
    Finalized { id: Uuid, status: ReservationStatus },

    #[error("reservation store unavailable: {0}")]
    Unavailable(String),
}

fn display_status(status: &Option<ReservationStatus>) -> &'static str {
    status.map(|s| s.as_str()).unwrap_or("unchecked")
}

/// Persistence for reservation records.
///
/// Status changes only go through [`ReservationStore::transition`], a
/// compare-and-set on the stored status, so redelivered payment callbacks
/// and racing writers converge on the same final state.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Assigns an id, `PENDING` status and timestamps.
    async fn create(&self, data: NewReservation) -> Result<Reservation, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Reservation, StoreError>;

    async fn update(&self, id: Uuid, patch: ReservationPatch) -> Result<Reservation, StoreError>;

    /// Only a `PENDING` reservation may be deleted.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Moves `id` from `from` to `to` only if the stored status is still `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        payment: Option<PaymentRecord>,
    ) -> Result<Reservation, StoreError>;
}

/// Bounds a store call; a store that does not answer in time is unavailable.
pub async fn within<T>(
    limit: Duration,
    operation: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or_else(|_| Err(StoreError::Unavailable(format!("no response within {:?}", limit))))
}

pub(crate) fn check_edge(id: Uuid, from: ReservationStatus, to: ReservationStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id,
            from,
            to,
            current: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryReservationStore {
    reservations: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.read().is_empty()
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn create(&self, data: NewReservation) -> Result<Reservation, StoreError> {
        let reservation = Reservation::new(data);
        self.reservations
            .write()
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: Uuid) -> Result<Reservation, StoreError> {
        self.reservations
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: Uuid, patch: ReservationPatch) -> Result<Reservation, StoreError> {
        let mut reservations = self.reservations.write();
        let reservation = reservations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(invoice) = patch.invoice {
            reservation.invoice = Some(invoice);
        }
        if let Some(special_request) = patch.special_request {
            reservation.special_request = Some(special_request);
        }
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write();
        let status = reservations.get(&id).ok_or(StoreError::NotFound(id))?.status;
        if status != ReservationStatus::Pending {
            return Err(StoreError::Finalized { id, status });
        }
        reservations.remove(&id);
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        payment: Option<PaymentRecord>,
    ) -> Result<Reservation, StoreError> {
        check_edge(id, from, to)?;

        let mut reservations = self.reservations.write();
        let reservation = reservations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if reservation.status != from {
            return Err(StoreError::InvalidTransition {
                id,
                from,
                to,
                current: Some(reservation.status),
            });
        }

        reservation.status = to;
        if to == ReservationStatus::Paid {
            reservation.payment = payment;
        }
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::{Customer, Guests, InvoiceRef, PricingPolicy, Room};

    fn new_reservation() -> NewReservation {
        let check_in = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        let check_out = NaiveDate::from_ymd_opt(2025, 11, 22).unwrap();
        NewReservation {
            room: Room {
                id: 2,
                slug: "limasan-room".to_string(),
                name: "Limasan Room".to_string(),
                price_per_night: 1_200_000,
            },
            check_in,
            check_out,
            guests: Guests { adults: 2, children: 1 },
            price: PricingPolicy::default().quote(1_200_000, check_in, check_out).unwrap(),
            customer: Customer {
                name: "Ayu".to_string(),
                email: "ayu@example.com".to_string(),
                phone: "+628123".to_string(),
                address: None,
                city: None,
                postal_code: None,
            },
            special_request: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_and_pending_status() {
        let store = MemoryReservationStore::new();
        let first = store.create(new_reservation()).await.unwrap();
        let second = store.create(new_reservation()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.status, ReservationStatus::Pending);
        assert!(first.invoice.is_none());
        assert_eq!(store.get(first.id).await.unwrap(), first);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn update_attaches_invoice_without_touching_status() {
        let store = MemoryReservationStore::new();
        let reservation = store.create(new_reservation()).await.unwrap();
        let invoice = InvoiceRef {
            invoice_id: "inv_1".to_string(),
            invoice_url: "https://checkout.example/inv_1".to_string(),
        };

        let updated = store
            .update(reservation.id, ReservationPatch::attach_invoice(invoice.clone()))
            .await
            .unwrap();
        assert_eq!(updated.invoice, Some(invoice));
        assert_eq!(updated.status, ReservationStatus::Pending);
        assert_eq!(updated.price, reservation.price);

        let missing = store.update(Uuid::new_v4(), ReservationPatch::default()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn transition_is_a_guarded_compare_and_set() {
        let store = MemoryReservationStore::new();
        let reservation = store.create(new_reservation()).await.unwrap();

        let expired = store
            .transition(reservation.id, ReservationStatus::Pending, ReservationStatus::Expired, None)
            .await
            .unwrap();
        assert_eq!(expired.status, ReservationStatus::Expired);

        let late_payment = store
            .transition(
                reservation.id,
                ReservationStatus::Pending,
                ReservationStatus::Paid,
                Some(PaymentRecord::default()),
            )
            .await;
        match late_payment {
            Err(StoreError::InvalidTransition { current, .. }) => {
                assert_eq!(current, Some(ReservationStatus::Expired))
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        assert_eq!(
            store.get(reservation.id).await.unwrap().status,
            ReservationStatus::Expired
        );
    }

    #[tokio::test]
    async fn illegal_edges_are_rejected_before_lookup() {
        let store = MemoryReservationStore::new();
        let result = store
            .transition(Uuid::new_v4(), ReservationStatus::Paid, ReservationStatus::Expired, None)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition { current: None, .. })
        ));
    }

    #[tokio::test]
    async fn terminal_reservations_are_never_deleted() {
        let store = MemoryReservationStore::new();
        let reservation = store.create(new_reservation()).await.unwrap();
        store
            .transition(reservation.id, ReservationStatus::Pending, ReservationStatus::Paid, None)
            .await
            .unwrap();

        let result = store.delete(reservation.id).await;
        assert!(matches!(
            result,
            Err(StoreError::Finalized { status: ReservationStatus::Paid, .. })
        ));
        assert!(store.get(reservation.id).await.is_ok());

        let pending = store.create(new_reservation()).await.unwrap();
        store.delete(pending.id).await.unwrap();
        assert!(matches!(store.get(pending.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(pending.id).await, Err(StoreError::NotFound(_))));
    }
}

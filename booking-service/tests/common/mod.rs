// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use booking_service::gateway::{GatewayError, InvoiceGateway, InvoiceRequest};
use booking_service::orchestrator::{BookerDetails, BookingOrchestrator, BookingRequest, BookingSettings};
use booking_service::store::{MemoryReservationStore, ReservationStore, StoreError};
use booking_service::StaticRoomCatalog;
use parking_lot::Mutex;
use shared::{InvoiceRef, NewReservation, PaymentRecord, Reservation, ReservationPatch, ReservationStatus};
use uuid::Uuid;

/// Gateway double that replays scripted results, then succeeds.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<Result<InvoiceRef, GatewayError>>>,
    requests: Mutex<Vec<InvoiceRequest>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_with(errors: impl IntoIterator<Item = GatewayError>) -> Arc<Self> {
        let gateway = Self::default();
        gateway.script.lock().extend(errors.into_iter().map(Err));
        Arc::new(gateway)
    }

    pub fn requests(&self) -> Vec<InvoiceRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl InvoiceGateway for MockGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceRef, GatewayError> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(result) => result,
            None => {
                let invoice_id = format!("inv_{}", request.external_reference.simple());
                Ok(InvoiceRef {
                    invoice_url: format!("https://checkout.xendit.test/web/{}", invoice_id),
                    invoice_id,
                })
            }
        }
    }
}

/// Gateway that accepts the request and never answers.
#[derive(Default)]
pub struct StalledGateway {
    calls: AtomicUsize,
}

impl StalledGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceGateway for StalledGateway {
    async fn create_invoice(&self, _request: &InvoiceRequest) -> Result<InvoiceRef, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(GatewayError::Interrupted("stalled gateway woke up".to_string()))
    }
}

/// Memory store whose calls can be made to fail or stall.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryReservationStore,
    pub fail_delete: AtomicBool,
    pub fail_update: AtomicBool,
    pub stall_create: AtomicBool,
    pub stall_transition: AtomicBool,
}

impl FlakyStore {
    pub fn failing_delete() -> Arc<Self> {
        let store = Self::default();
        store.fail_delete.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn failing_update() -> Arc<Self> {
        let store = Self::default();
        store.fail_update.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn stalling_create() -> Arc<Self> {
        let store = Self::default();
        store.stall_create.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn stalling_transition() -> Arc<Self> {
        let store = Self::default();
        store.stall_transition.store(true, Ordering::SeqCst);
        Arc::new(store)
    }
}

#[async_trait]
impl ReservationStore for FlakyStore {
    async fn create(&self, data: NewReservation) -> Result<Reservation, StoreError> {
        if self.stall_create.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.create(data).await
    }

    async fn get(&self, id: Uuid) -> Result<Reservation, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, patch: ReservationPatch) -> Result<Reservation, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.delete(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        payment: Option<PaymentRecord>,
    ) -> Result<Reservation, StoreError> {
        if self.stall_transition.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.transition(id, from, to, payment).await
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn settings() -> BookingSettings {
    BookingSettings {
        public_url: "https://tembi.test".to_string(),
        gateway_timeout: Duration::from_millis(500),
        store_timeout: Duration::from_millis(500),
        ..BookingSettings::default()
    }
}

/// Short bounds so stalled collaborators fail fast.
pub fn tight_settings() -> BookingSettings {
    BookingSettings {
        gateway_timeout: Duration::from_millis(200),
        store_timeout: Duration::from_millis(200),
        ..settings()
    }
}

pub fn orchestrator(store: Arc<dyn ReservationStore>, gateway: Arc<dyn InvoiceGateway>) -> BookingOrchestrator {
    BookingOrchestrator::new(store, gateway, Arc::new(StaticRoomCatalog::default()), settings())
}

/// Two nights in the Joglo Suite: 3,000,000 + 150,000 fee + 60,000 tax.
pub const JOGLO_TWO_NIGHTS_TOTAL: i64 = 3_210_000;

pub fn booking_request() -> BookingRequest {
    BookingRequest {
        room_slug: Some("joglo-suite".to_string()),
        check_in: Some("2025-11-20".to_string()),
        check_out: Some("2025-11-22".to_string()),
        adults: Some(2),
        children: Some(1),
        booker: Some(BookerDetails {
            name: Some("Dewi Lestari".to_string()),
            email: Some("dewi@example.com".to_string()),
            phone: Some("+6281234567890".to_string()),
            address: Some("Jl. Prawirotaman 12".to_string()),
            city: Some("Yogyakarta".to_string()),
            postal_code: Some("55153".to_string()),
        }),
        special_request: Some("Vegetarian breakfast".to_string()),
        total_amount: Some(JOGLO_TWO_NIGHTS_TOTAL),
    }
}

pub fn paid_callback(reservation_id: Uuid) -> Vec<u8> {
    serde_json::json!({
        "id": "579c8d61f23fa4ca35e52da4",
        "external_id": reservation_id.to_string(),
        "status": "PAID",
        "paid_at": "2025-11-18T10:22:51.123Z",
        "payment_method": "BANK_TRANSFER",
        "payment_channel": "BCA"
    })
    .to_string()
    .into_bytes()
}

pub fn expired_callback(reservation_id: Uuid) -> Vec<u8> {
    serde_json::json!({
        "event": "invoices.expired",
        "data": {
            "id": "579c8d61f23fa4ca35e52da4",
            "external_id": reservation_id.to_string(),
            "status": "EXPIRED"
        }
    })
    .to_string()
    .into_bytes()
}

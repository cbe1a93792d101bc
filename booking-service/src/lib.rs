pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod outbox;
pub mod pg_store;
pub mod reconciler;
pub mod schema;
pub mod store;

pub use catalog::{RoomCatalog, StaticRoomCatalog};
pub use error::{BookingError, WebhookError};
pub use gateway::{GatewayError, InvoiceGateway, InvoiceRequest, XenditGateway};
pub use orchestrator::{BookingConfirmation, BookingOrchestrator, BookingRequest, BookingSettings};
pub use reconciler::{WebhookOutcome, WebhookReconciler};
pub use store::{MemoryReservationStore, ReservationStore, StoreError};

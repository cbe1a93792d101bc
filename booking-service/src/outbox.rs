use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::PoolError;
use diesel_async::RunQueryDsl;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::ReservationEvent;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::DbOutboxEvent;
use crate::pg_store::DbPool;
use crate::schema::outbox_events;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("event broker rejected reservation event: {0}")]
    Publish(String),

    #[error("outbox query failed: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("outbox connection pool: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),
}

/// Destination for settled-reservation events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), RelayError>;
}

/// Publishes to one topic, keyed by reservation id so a reservation's
/// events share a partition.
pub struct KafkaEventSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventSink {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn publish(&self, event: &ReservationEvent) -> Result<(), RelayError> {
        let payload = serde_json::to_string(event).map_err(|e| RelayError::Publish(e.to_string()))?;
        let key = event.reservation_id.to_string();
        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&key)
            .headers(OwnedHeaders::new().insert(Header {
                key: "event_type",
                value: Some(event.event_type.as_str()),
            }));

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map(|_| ())
            .map_err(|(e, _)| RelayError::Publish(e.to_string()))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RelayBatch {
    pub published: Vec<Uuid>,
    /// Rows whose payload no longer decodes; they can never be published.
    pub discarded: Vec<Uuid>,
    /// Rows left for the next pass after the sink failed.
    pub deferred: usize,
}

impl RelayBatch {
    /// Outbox rows that can be removed.
    pub fn settled(&self) -> Vec<Uuid> {
        self.published.iter().chain(&self.discarded).copied().collect()
    }
}

/// Publishes rows oldest first and stops at the first sink failure.
pub async fn relay(sink: &dyn EventSink, rows: Vec<DbOutboxEvent>) -> RelayBatch {
    let mut batch = RelayBatch::default();
    let mut rows = rows.into_iter();

    while let Some(row) = rows.next() {
        let event: ReservationEvent = match serde_json::from_value(row.event_data) {
            Ok(event) => event,
            Err(e) => {
                error!(outbox_id = %row.id, "Discarding undecodable {} event: {}", row.event_type, e);
                batch.discarded.push(row.id);
                continue;
            }
        };

        if let Err(e) = sink.publish(&event).await {
            warn!(
                reservation_id = %event.reservation_id,
                "Event broker unavailable, deferring outbox: {}", e
            );
            batch.deferred = 1 + rows.len();
            break;
        }
        batch.published.push(row.id);
    }

    batch
}

/// Drains `outbox_events` into an [`EventSink`], deleting rows once they are
/// published. Delivery is at-least-once.
pub struct OutboxRelay {
    pool: DbPool,
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
    batch_size: i64,
}

impl OutboxRelay {
    pub fn new(pool: DbPool, sink: Arc<dyn EventSink>) -> Self {
        Self {
            pool,
            sink,
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            match self.drain().await {
                Ok(0) => {}
                Ok(published) => info!("Relayed {} reservation events", published),
                Err(e) => error!("Outbox relay failed: {}", e),
            }
        }
    }

    /// One pass over the oldest pending rows. Returns how many were published.
    pub async fn drain(&self) -> Result<usize, RelayError> {
        let rows = {
            let mut conn = self.pool.get().await?;
            outbox_events::table
                .order(outbox_events::created_at.asc())
                .limit(self.batch_size)
                .select(DbOutboxEvent::as_select())
                .load(&mut conn)
                .await?
        };
        if rows.is_empty() {
            return Ok(0);
        }

        let batch = relay(self.sink.as_ref(), rows).await;
        let settled = batch.settled();
        if !settled.is_empty() {
            let mut conn = self.pool.get().await?;
            diesel::delete(outbox_events::table.filter(outbox_events::id.eq_any(settled)))
                .execute(&mut conn)
                .await?;
        }
        if batch.deferred > 0 {
            debug!(deferred = batch.deferred, "Outbox rows left for the next pass");
        }

        Ok(batch.published.len())
    }
}

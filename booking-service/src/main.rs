use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use booking_service::api;
use booking_service::config::{Config, StoreBackend};
use booking_service::outbox::{KafkaEventSink, OutboxRelay};
use booking_service::pg_store::PgReservationStore;
use booking_service::{
    BookingOrchestrator, MemoryReservationStore, ReservationStore, RoomCatalog, StaticRoomCatalog,
    WebhookReconciler, XenditGateway,
};
use clap::Parser;
use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::parse();

    let catalog: Arc<dyn RoomCatalog> = match &config.room_catalog {
        Some(path) => {
            let catalog = StaticRoomCatalog::from_json_file(path)?;
            info!("Loaded {} rooms from {}", catalog.rooms().len(), path.display());
            Arc::new(catalog)
        }
        None => Arc::new(StaticRoomCatalog::default()),
    };

    let store: Arc<dyn ReservationStore> = match config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory reservation store; reservations are lost on restart");
            Arc::new(MemoryReservationStore::new())
        }
        StoreBackend::Postgres => {
            // Run migrations first
            info!("Running database migrations...");
            let mut conn = PgConnection::establish(&config.database_url)?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
            info!("Migrations completed successfully");

            let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
            let pool = Pool::builder()
                .connection_timeout(Duration::from_secs(config.store_timeout_secs))
                .build(manager)
                .await?;

            match &config.kafka_brokers {
                Some(brokers) => {
                    let producer: FutureProducer = ClientConfig::new()
                        .set("bootstrap.servers", brokers)
                        .set("message.timeout.ms", "5000")
                        .create()?;
                    let sink = KafkaEventSink::new(producer, config.events_topic.clone());
                    let relay = OutboxRelay::new(pool.clone(), Arc::new(sink))
                        .with_poll_interval(Duration::from_secs(config.outbox_poll_interval_secs.max(1)));
                    tokio::spawn(async move {
                        relay.run().await;
                    });
                    info!("Relaying reservation events to {}", config.events_topic);
                }
                None => info!("KAFKA_BROKERS not set; reservation events stay in the outbox"),
            }

            Arc::new(PgReservationStore::new(pool))
        }
    };

    if config.xendit_api_key.is_empty() {
        warn!("XENDIT_API_KEY is empty; invoice creation will be rejected by the gateway");
    }
    let gateway = Arc::new(XenditGateway::new(config.xendit_settings())?);

    let settings = config.booking_settings();
    let store_timeout = settings.store_timeout;
    let orchestrator = BookingOrchestrator::new(store.clone(), gateway, catalog, settings);
    let reconciler = WebhookReconciler::new(store, config.verification_token()).with_store_timeout(store_timeout);

    let app = api::create_router(api::AppState {
        orchestrator: Arc::new(orchestrator),
        reconciler: Arc::new(reconciler),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("Booking service started on port {}", config.port);
    info!("Accepting bookings at http://0.0.0.0:{}/api/booking", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

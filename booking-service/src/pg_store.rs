use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::PoolError;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use crate::store::{check_edge, ReservationStore, StoreError};

pub type DbPool = Pool<AsyncPgConnection>;

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Unavailable(format!("database error: {}", err))
    }
}

impl From<bb8::RunError<PoolError>> for StoreError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        StoreError::Unavailable(format!("connection pool: {}", err))
    }
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("unreadable reservation row: {}", err))
}

pub struct PgReservationStore {
    pool: DbPool,
}

impl PgReservationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn current_status(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Option<ReservationStatus>, StoreError> {
    let status = reservations::table
        .find(id)
        .select(reservations::status)
        .first::<String>(conn)
        .await
        .optional()?;
    status.map(|s| s.parse().map_err(corrupt)).transpose()
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn create(&self, data: NewReservation) -> Result<Reservation, StoreError> {
        let reservation = Reservation::new(data);
        let row = NewReservationRow::try_from(&reservation).map_err(corrupt)?;

        let mut conn = self.pool.get().await?;
        diesel::insert_into(reservations::table)
            .values(&row)
            .execute(&mut conn)
            .await?;

        Ok(reservation)
    }

    async fn get(&self, id: Uuid) -> Result<Reservation, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = reservations::table
            .find(id)
            .select(ReservationRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(StoreError::NotFound(id))?;
        Reservation::try_from(row).map_err(corrupt)
    }

    async fn update(&self, id: Uuid, patch: ReservationPatch) -> Result<Reservation, StoreError> {
        let changeset = ReservationChangeset::from(patch);
        let mut conn = self.pool.get().await?;
        let row = diesel::update(reservations::table.find(id))
            .set(&changeset)
            .returning(ReservationRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?
            .ok_or(StoreError::NotFound(id))?;
        Reservation::try_from(row).map_err(corrupt)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(
            reservations::table
                .filter(reservations::id.eq(id))
                .filter(reservations::status.eq(ReservationStatus::Pending.as_str())),
        )
        .execute(&mut conn)
        .await?;

        if deleted == 1 {
            return Ok(());
        }
        match current_status(&mut conn, id).await? {
            None => Err(StoreError::NotFound(id)),
            Some(status) => Err(StoreError::Finalized { id, status }),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        payment: Option<PaymentRecord>,
    ) -> Result<Reservation, StoreError> {
        check_edge(id, from, to)?;
        let payment = payment.filter(|_| to == ReservationStatus::Paid).unwrap_or_default();

        let mut conn = self.pool.get().await?;
        let reservation = conn
            .transaction::<_, StoreError, _>(|conn| {
                async move {
                    let updated = diesel::update(
                        reservations::table
                            .filter(reservations::id.eq(id))
                            .filter(reservations::status.eq(from.as_str())),
                    )
                    .set((
                        reservations::status.eq(to.as_str()),
                        reservations::paid_at.eq(payment.paid_at),
                        reservations::payment_method.eq(payment.method),
                        reservations::updated_at.eq(Utc::now()),
                    ))
                    .returning(ReservationRow::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;

                    let Some(row) = updated else {
                        return Err(match current_status(conn, id).await? {
                            None => StoreError::NotFound(id),
                            current => StoreError::InvalidTransition { id, from, to, current },
                        });
                    };
                    let reservation = Reservation::try_from(row).map_err(corrupt)?;

                    if let Some(event) = ReservationEvent::settled(&reservation) {
                        let outbox_event = DbOutboxEvent::from(OutboxEvent::new(&event).map_err(corrupt)?);
                        diesel::insert_into(outbox_events::table)
                            .values(&outbox_event)
                            .execute(conn)
                            .await?;
                    }

                    Ok(reservation)
                }
                .scope_boxed()
            })
            .await?;

        info!("Reservation {} moved {} -> {}", id, from, to);
        Ok(reservation)
    }
}

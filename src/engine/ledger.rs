//! # Libro de reservas
//!
//! Dueño de los registros de reserva: creación validada, lecturas, flujo de
//! estados y mutación del precio total. Toda mutación iniciada por un usuario
//! pasa antes por [`ReservationLedger::get_owned`].

use uuid::Uuid;

use super::availability::{check_table_conflict, is_admissible};
use super::store::{AdmissionCheck, TotalFold};
use super::{Context, EngineError, EngineEvent, EngineResult};
use crate::db::models::{Interval, LineItem, Reservation, ReservationStatus};

#[derive(Clone)]
pub struct ReservationLedger {
    ctx: Context,
}

impl ReservationLedger {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Crea una reserva `Pending` con total cero y sin platos
    ///
    /// # Errores
    /// - `NotFound`: la mesa no existe en el catálogo
    /// - `Validation`: la mesa pertenece a otro restaurante
    /// - `CatalogLookupFailed`: no hay horario para ese día
    /// - `OutsideOperatingHours` / `TableConflict`: propagados del comprobador
    /// - `UpstreamUnavailable`: timeout o fallo de catálogo/persistencia. La
    ///   reserva puede existir igualmente; consultar [`ReservationLedger::list_by_user`]
    ///   antes de repetir la petición
    pub async fn create_reservation(
        &self,
        user_id: Uuid,
        table_id: Uuid,
        restaurant_id: Uuid,
        interval: Interval,
    ) -> EngineResult<Reservation> {
        let table = self
            .ctx
            .bounded("get_table", self.ctx.catalog.table(table_id))
            .await?
            .ok_or_else(|| EngineError::not_found("table", table_id))?;

        if table.restaurant_id != restaurant_id {
            return Err(EngineError::Validation(format!(
                "La mesa {} no pertenece al restaurante {}",
                table_id, restaurant_id
            )));
        }

        let weekday = interval.weekday();
        let hours = self
            .ctx
            .bounded(
                "get_operating_hours",
                self.ctx.catalog.operating_hours(restaurant_id, weekday),
            )
            .await?
            .ok_or_else(|| EngineError::CatalogLookupFailed {
                restaurant_id: restaurant_id.to_string(),
                reason: format!("sin horario para el día {}", weekday),
            })?;

        let committed = self.ctx.settings.committed;
        let admit = |existing: &[Reservation]| {
            is_admissible(&interval, &hours, existing, committed).into_result(weekday, table_id)
        };

        let reservation = Reservation::pending(user_id, restaurant_id, table_id, interval);
        let inserted = self
            .ctx
            .bounded(
                "insert_reservation",
                self.ctx.store.insert_reservation(&reservation, &admit),
            )
            .await;

        match inserted {
            Ok(()) => {
                self.ctx.emit(EngineEvent::ReservationCreated {
                    reservation_id: reservation.id,
                    table_id,
                    user_id,
                });
                Ok(reservation)
            }
            Err(e) => {
                if matches!(
                    e,
                    EngineError::TableConflict { .. } | EngineError::OutsideOperatingHours { .. }
                ) {
                    self.ctx.emit(EngineEvent::ReservationRejected {
                        table_id,
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    pub async fn get_reservation(&self, id: Uuid) -> EngineResult<Reservation> {
        self.ctx
            .bounded("get_reservation", self.ctx.store.find_reservation(id))
            .await?
            .ok_or_else(|| EngineError::not_found("reservation", id))
    }

    /// Reserva existente y perteneciente a `user_id`
    pub async fn get_owned(&self, user_id: Uuid, id: Uuid) -> EngineResult<Reservation> {
        let reservation = self.get_reservation(id).await?;
        ensure_owner(&reservation, user_id)?;
        Ok(reservation)
    }

    /// Todas las reservas del usuario, en cualquier estado y sin orden garantizado
    pub async fn list_by_user(&self, user_id: Uuid) -> EngineResult<Vec<Reservation>> {
        self.ctx
            .bounded("list_reservations", self.ctx.store.reservations_by_user(user_id))
            .await
    }

    /// Sobrescritura idempotente; solo el agregador de pedidos debería llamarla
    pub async fn update_total_price(&self, id: Uuid, total_price: i64) -> EngineResult<()> {
        if total_price < 0 {
            return Err(EngineError::Validation(
                "El precio total no puede ser negativo".to_string(),
            ));
        }
        self.ctx
            .bounded("update_total_price", self.ctx.store.set_total_price(id, total_price))
            .await
    }

    pub async fn attach_review(&self, id: Uuid, review_id: Uuid) -> EngineResult<()> {
        self.ctx
            .bounded("attach_review", self.ctx.store.attach_review(id, review_id))
            .await
    }

    /// Paso del flujo de aprobación externo
    ///
    /// Entrar en un estado comprometido vuelve a comprobar el solapamiento
    /// contra el resto de reservas de la mesa, de forma atómica con la escritura.
    pub async fn transition(&self, id: Uuid, to: ReservationStatus) -> EngineResult<Reservation> {
        let current = self.get_reservation(id).await?;
        let from = current.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidStatusTransition { from, to });
        }

        let committed = self.ctx.settings.committed;
        let interval = current.interval;
        let table_id = current.table_id;
        let weekday = interval.weekday();
        let admit = |others: &[Reservation]| {
            check_table_conflict(&interval, others, committed).into_result(weekday, table_id)
        };
        let check: AdmissionCheck<'_> = &admit;
        let needs_check = committed.contains(to) && !committed.contains(from);

        let updated = self
            .ctx
            .bounded(
                "update_status",
                self.ctx
                    .store
                    .update_status(id, from, to, needs_check.then_some(check)),
            )
            .await?;

        self.ctx.emit(EngineEvent::StatusChanged {
            reservation_id: id,
            from,
            to,
        });
        Ok(updated)
    }

    /// Paso del flujo de aprobación iniciado por el restaurante de la reserva
    ///
    /// # Errores
    /// - `NotRestaurantReservation`: la reserva es de otro restaurante
    /// - los mismos que [`ReservationLedger::transition`]
    pub async fn decide(
        &self,
        restaurant_id: Uuid,
        id: Uuid,
        to: ReservationStatus,
    ) -> EngineResult<Reservation> {
        let reservation = self.get_reservation(id).await?;
        if reservation.restaurant_id != restaurant_id {
            return Err(EngineError::NotRestaurantReservation {
                reservation_id: id.to_string(),
            });
        }
        self.transition(id, to).await
    }

    /// Cancelación blanda iniciada por el dueño; la reserva nunca se borra
    pub async fn cancel(&self, user_id: Uuid, id: Uuid) -> EngineResult<Reservation> {
        self.get_owned(user_id, id).await?;
        self.transition(id, ReservationStatus::Cancelled).await
    }

    pub(crate) async fn apply_line_items(
        &self,
        id: Uuid,
        owner: Uuid,
        items: &[LineItem],
        fold: TotalFold<'_>,
    ) -> EngineResult<Reservation> {
        self.ctx
            .bounded(
                "append_line_items",
                self.ctx.store.append_line_items(id, owner, items, fold),
            )
            .await
    }
}

pub(crate) fn ensure_owner(reservation: &Reservation, user_id: Uuid) -> EngineResult<()> {
    if reservation.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(EngineError::NotOwner {
            reservation_id: reservation.id.to_string(),
        })
    }
}

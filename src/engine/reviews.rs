//! # Enlace de reseñas
//!
//! Una reseña por reserva. La comprobación previa da un error claro en el
//! caso normal; la unicidad real la garantiza el almacenamiento al insertar y
//! enlazar en la misma transacción.

use uuid::Uuid;

use super::ledger::{ensure_owner, ReservationLedger};
use super::{Context, EngineError, EngineEvent, EngineResult};
use crate::db::models::{current_timestamp, Ratings, ReservationStatus, Review};

#[derive(Clone)]
pub struct ReviewLinker {
    ledger: ReservationLedger,
    ctx: Context,
}

impl ReviewLinker {
    pub(crate) fn new(ledger: ReservationLedger, ctx: Context) -> Self {
        Self { ledger, ctx }
    }

    /// Crea la reseña y la enlaza en la reserva
    ///
    /// # Errores
    /// - `Validation`: valoraciones fuera de rango
    /// - `NotFound`: la reserva no existe
    /// - `NotOwner`: la reserva es de otro usuario
    /// - `ReviewAlreadyExists`: el usuario ya reseñó esta reserva
    /// - `ReviewNotAllowed`: la reserva no está `Completed` (si así se configura)
    /// - `ReviewAlreadyAttached`: la reserva ya tenía otra reseña enlazada
    pub async fn create_review(
        &self,
        user_id: Uuid,
        reservation_id: Uuid,
        content: String,
        ratings: Ratings,
    ) -> EngineResult<Uuid> {
        ratings.validate()?;

        let reservation = self.ledger.get_reservation(reservation_id).await?;
        ensure_owner(&reservation, user_id)?;

        let existing = self
            .ctx
            .bounded(
                "find_review",
                self.ctx.store.find_review(user_id, reservation_id),
            )
            .await?;
        if existing.is_some() {
            return Err(EngineError::ReviewAlreadyExists {
                reservation_id: reservation_id.to_string(),
            });
        }

        if self.ctx.settings.reviews_require_completed
            && reservation.status != ReservationStatus::Completed
        {
            return Err(EngineError::ReviewNotAllowed {
                status: reservation.status,
            });
        }

        let review = Review {
            id: Uuid::new_v4(),
            user_id,
            restaurant_id: reservation.restaurant_id,
            reservation_id,
            content,
            ratings,
            created_at: current_timestamp(),
        };

        self.ctx
            .bounded("insert_review", self.ctx.store.insert_review_linked(&review))
            .await?;

        self.ctx.emit(EngineEvent::ReviewLinked {
            reservation_id,
            review_id: review.id,
        });
        Ok(review.id)
    }
}

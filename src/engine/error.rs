//! # Errores del motor de reservas
//!
//! Taxonomía cerrada que el motor devuelve sin modificar al llamante. Un
//! conflicto de escritura al confirmar una transacción se reintenta en el
//! almacenamiento; solo la comprobación de admisión produce `TableConflict`.
//! La violación del índice único de reseñas llega como `ReviewAlreadyExists`
//! y agotar los reintentos como `UpstreamUnavailable`; nunca se expone un
//! error crudo de almacenamiento.

use thiserror::Error;

use crate::db::models::ReservationStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// El intervalo cae fuera del horario del restaurante ese día
    #[error("Fuera del horario del restaurante (día {weekday}): {detail}")]
    OutsideOperatingHours { weekday: u8, detail: String },

    /// La mesa ya tiene una reserva comprometida que se solapa
    #[error("La mesa {table_id} ya está reservada en ese horario")]
    TableConflict { table_id: String },

    /// No se pudo obtener el horario del restaurante
    #[error("No se pudo consultar el catálogo del restaurante {restaurant_id}: {reason}")]
    CatalogLookupFailed { restaurant_id: String, reason: String },

    #[error("No encontrado: {entity} con ID '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("La reserva {reservation_id} no pertenece al usuario")]
    NotOwner { reservation_id: String },

    /// El restaurante que decide no es el de la reserva
    #[error("La reserva {reservation_id} no pertenece al restaurante")]
    NotRestaurantReservation { reservation_id: String },

    #[error("Ya existe una reseña para la reserva {reservation_id}")]
    ReviewAlreadyExists { reservation_id: String },

    #[error("La reserva {reservation_id} ya tiene una reseña enlazada")]
    ReviewAlreadyAttached { reservation_id: String },

    /// Error reintentable: timeout o fallo del catálogo/persistencia
    ///
    /// Tras un timeout la escritura puede haberse confirmado igualmente: antes
    /// de repetir una creación, el llamante debe consultar sus reservas.
    #[error("Servicio externo no disponible en '{operation}': {reason}")]
    UpstreamUnavailable { operation: String, reason: String },

    #[error("Intervalo inválido: inicio {start} no es anterior a fin {end}")]
    InvalidInterval { start: String, end: String },

    #[error("Transición de estado no permitida: {from} -> {to}")]
    InvalidStatusTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("No se puede reseñar una reserva en estado {status}")]
    ReviewNotAllowed { status: ReservationStatus },

    #[error("Error de validación: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn upstream(operation: &str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Solo los fallos de servicios externos merecen reintento por el llamante
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

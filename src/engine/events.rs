//! # Eventos del motor
//!
//! El motor no escribe logs por su cuenta: cada operación emite
//! [`EngineEvent`]s a través del [`EventSink`] inyectado. En producción
//! [`TracingSink`] los convierte en registros de `tracing`; en tests
//! [`RecordingSink`] los acumula para poder inspeccionarlos.

use std::sync::Mutex;
use uuid::Uuid;

use super::orders::SkipReason;
use crate::db::models::ReservationStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ReservationCreated {
        reservation_id: Uuid,
        table_id: Uuid,
        user_id: Uuid,
    },
    ReservationRejected {
        table_id: Uuid,
        reason: String,
    },
    StatusChanged {
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    LineSkipped {
        reservation_id: Uuid,
        dish_id: Uuid,
        reason: SkipReason,
    },
    ItemsAdded {
        reservation_id: Uuid,
        added: usize,
        skipped: usize,
        total_price: i64,
    },
    ReviewLinked {
        reservation_id: Uuid,
        review_id: Uuid,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink de producción: un registro `tracing` estructurado por evento
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::ReservationCreated { reservation_id, table_id, user_id } => {
                tracing::info!(
                    reservation_id = %reservation_id,
                    table_id = %table_id,
                    user_id = %user_id,
                    "Reserva creada"
                );
            }
            EngineEvent::ReservationRejected { table_id, reason } => {
                tracing::info!(table_id = %table_id, reason = %reason, "Reserva rechazada");
            }
            EngineEvent::StatusChanged { reservation_id, from, to } => {
                tracing::info!(
                    reservation_id = %reservation_id,
                    from = %from,
                    to = %to,
                    "Estado de reserva actualizado"
                );
            }
            EngineEvent::LineSkipped { reservation_id, dish_id, reason } => {
                tracing::warn!(
                    reservation_id = %reservation_id,
                    dish_id = %dish_id,
                    reason = ?reason,
                    "Línea de pedido descartada"
                );
            }
            EngineEvent::ItemsAdded { reservation_id, added, skipped, total_price } => {
                tracing::info!(
                    reservation_id = %reservation_id,
                    added,
                    skipped,
                    total_price,
                    "Platos añadidos a la reserva"
                );
            }
            EngineEvent::ReviewLinked { reservation_id, review_id } => {
                tracing::info!(
                    reservation_id = %reservation_id,
                    review_id = %review_id,
                    "Reseña enlazada"
                );
            }
        }
    }
}

/// Acumula los eventos en memoria
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

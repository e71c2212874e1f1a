//! # Almacenamiento en memoria
//!
//! Implementa [`LedgerStore`] y [`ScheduleCatalog`] sin base de datos. Todas
//! las operaciones compuestas se ejecutan con el cerrojo del estado tomado, de
//! modo que lectura, comprobación y escritura forman una única unidad.
//!
//! Se usa en los tests y con `STORAGE_BACKEND=memory`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::models::{
    current_timestamp, Dish, LineItem, Reservation, ReservationStatus, Review, Table, TimeSlot,
};
use crate::engine::store::{AdmissionCheck, TotalFold};
use crate::engine::{EngineError, EngineResult, LedgerStore, ScheduleCatalog};

#[derive(Debug, Default)]
struct LedgerState {
    reservations: HashMap<Uuid, Reservation>,
    reviews: HashMap<Uuid, Review>,
}

#[derive(Debug, Default)]
struct CatalogState {
    time_slots: HashMap<(Uuid, u8), TimeSlot>,
    tables: HashMap<Uuid, Table>,
    dishes: HashMap<Uuid, Dish>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    ledger: Arc<Mutex<LedgerState>>,
    catalog: Arc<RwLock<CatalogState>>,
    latency_ms: Arc<AtomicU64>,
    ack_latency_ms: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_time_slot(&self, slot: TimeSlot) {
        self.catalog
            .write()
            .await
            .time_slots
            .insert((slot.restaurant_id, slot.weekday), slot);
    }

    /// Abre los siete días con el mismo horario
    pub async fn open_every_day(&self, restaurant_id: Uuid, hour_start: u32, hour_end: u32) {
        for weekday in 0..7u8 {
            self.put_time_slot(TimeSlot {
                restaurant_id,
                weekday,
                hour_start,
                hour_end,
                closed: false,
            })
            .await;
        }
    }

    pub async fn put_table(&self, table: Table) {
        self.catalog.write().await.tables.insert(table.id, table);
    }

    /// Inserta o reemplaza un plato (también sirve para cambiar su precio)
    pub async fn put_dish(&self, dish: Dish) {
        self.catalog.write().await.dishes.insert(dish.id, dish);
    }

    /// Retardo artificial antes de cada operación, para simular un servicio lento
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Retardo tras confirmar cada escritura: la escritura ya es visible
    /// aunque el llamante deje de esperar la respuesta
    pub fn set_ack_latency(&self, latency: Duration) {
        self.ack_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    async fn simulate_latency(&self) {
        sleep_ms(self.latency_ms.load(Ordering::Relaxed)).await;
    }

    async fn acknowledge(&self) {
        sleep_ms(self.ack_latency_ms.load(Ordering::Relaxed)).await;
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn table_reservations(state: &LedgerState, table_id: Uuid, except: Option<Uuid>) -> Vec<Reservation> {
    state
        .reservations
        .values()
        .filter(|r| r.table_id == table_id && Some(r.id) != except)
        .cloned()
        .collect()
}

#[async_trait]
impl ScheduleCatalog for MemoryStore {
    async fn operating_hours(&self, restaurant_id: Uuid, weekday: u8) -> EngineResult<Option<TimeSlot>> {
        self.simulate_latency().await;
        Ok(self
            .catalog
            .read()
            .await
            .time_slots
            .get(&(restaurant_id, weekday))
            .cloned())
    }

    async fn table(&self, table_id: Uuid) -> EngineResult<Option<Table>> {
        self.simulate_latency().await;
        Ok(self.catalog.read().await.tables.get(&table_id).cloned())
    }

    async fn catalog_dish(&self, restaurant_id: Uuid, dish_id: Uuid) -> EngineResult<Option<Dish>> {
        self.simulate_latency().await;
        Ok(self
            .catalog
            .read()
            .await
            .dishes
            .get(&dish_id)
            .filter(|dish| dish.restaurant_id == restaurant_id)
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn reservations_for_table(&self, table_id: Uuid) -> EngineResult<Vec<Reservation>> {
        self.simulate_latency().await;
        let state = self.ledger.lock().await;
        Ok(table_reservations(&state, table_id, None))
    }

    async fn insert_reservation(&self, reservation: &Reservation, admit: AdmissionCheck<'_>) -> EngineResult<()> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        let existing = table_reservations(&state, reservation.table_id, None);
        admit(existing.as_slice())?;
        state.reservations.insert(reservation.id, reservation.clone());
        drop(state);
        self.acknowledge().await;
        Ok(())
    }

    async fn find_reservation(&self, id: Uuid) -> EngineResult<Option<Reservation>> {
        self.simulate_latency().await;
        Ok(self.ledger.lock().await.reservations.get(&id).cloned())
    }

    async fn reservations_by_user(&self, user_id: Uuid) -> EngineResult<Vec<Reservation>> {
        self.simulate_latency().await;
        let state = self.ledger.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_total_price(&self, id: Uuid, total_price: i64) -> EngineResult<()> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        reservation.total_price = total_price;
        reservation.updated_at = current_timestamp();
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        admit: Option<AdmissionCheck<'_>>,
    ) -> EngineResult<Reservation> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        let (current, table_id) = state
            .reservations
            .get(&id)
            .map(|r| (r.status, r.table_id))
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        if current != from {
            return Err(EngineError::InvalidStatusTransition { from: current, to });
        }
        if let Some(admit) = admit {
            let others = table_reservations(&state, table_id, Some(id));
            admit(others.as_slice())?;
        }

        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        reservation.status = to;
        reservation.updated_at = current_timestamp();
        let updated = reservation.clone();
        drop(state);
        self.acknowledge().await;
        Ok(updated)
    }

    async fn append_line_items(
        &self,
        id: Uuid,
        owner: Uuid,
        items: &[LineItem],
        fold: TotalFold<'_>,
    ) -> EngineResult<Reservation> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        if !reservation.is_owned_by(owner) {
            return Err(EngineError::NotOwner {
                reservation_id: id.to_string(),
            });
        }

        let mut line_items = reservation.line_items.clone();
        line_items.extend_from_slice(items);
        // si el total no cabe, la reserva queda intacta
        let total_price = fold(line_items.as_slice())?;

        reservation.line_items = line_items;
        reservation.total_price = total_price;
        reservation.updated_at = current_timestamp();
        let updated = reservation.clone();
        drop(state);
        self.acknowledge().await;
        Ok(updated)
    }

    async fn attach_review(&self, id: Uuid, review_id: Uuid) -> EngineResult<()> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        if reservation.review_id.is_some() {
            return Err(EngineError::ReviewAlreadyAttached {
                reservation_id: id.to_string(),
            });
        }
        reservation.review_id = Some(review_id);
        reservation.updated_at = current_timestamp();
        Ok(())
    }

    async fn find_review(&self, user_id: Uuid, reservation_id: Uuid) -> EngineResult<Option<Review>> {
        self.simulate_latency().await;
        let state = self.ledger.lock().await;
        Ok(state
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.reservation_id == reservation_id)
            .cloned())
    }

    async fn insert_review_linked(&self, review: &Review) -> EngineResult<()> {
        self.simulate_latency().await;
        let mut state = self.ledger.lock().await;
        if state
            .reviews
            .values()
            .any(|r| r.reservation_id == review.reservation_id)
        {
            return Err(EngineError::ReviewAlreadyExists {
                reservation_id: review.reservation_id.to_string(),
            });
        }

        let reservation = state
            .reservations
            .get_mut(&review.reservation_id)
            .ok_or_else(|| EngineError::not_found("reservation", review.reservation_id))?;
        if reservation.review_id.is_some() {
            return Err(EngineError::ReviewAlreadyAttached {
                reservation_id: review.reservation_id.to_string(),
            });
        }
        reservation.review_id = Some(review.id);
        reservation.updated_at = current_timestamp();
        state.reviews.insert(review.id, review.clone());
        drop(state);
        self.acknowledge().await;
        Ok(())
    }
}

//! # Contratos con catálogo y persistencia
//!
//! El motor solo habla con estas dos fronteras. Las operaciones compuestas de
//! [`LedgerStore`] son unidades atómicas: la implementación debe ejecutar la
//! lectura, la comprobación recibida y la escritura dentro de la misma
//! transacción (o bajo el mismo cerrojo), de modo que dos peticiones
//! concurrentes nunca vean ambas "sin conflicto".

use async_trait::async_trait;
use uuid::Uuid;

use super::EngineResult;
use crate::db::models::{Dish, LineItem, Reservation, ReservationStatus, Review, Table, TimeSlot};

/// Comprobación de admisión ejecutada dentro de la unidad atómica con las
/// reservas actuales de la mesa
pub type AdmissionCheck<'a> = &'a (dyn Fn(&[Reservation]) -> EngineResult<()> + Send + Sync);

/// Recalcula el total a partir de todas las líneas de la reserva
pub type TotalFold<'a> = &'a (dyn Fn(&[LineItem]) -> EngineResult<i64> + Send + Sync);

/// Catálogo del restaurante (colaborador externo, solo lectura)
#[async_trait]
pub trait ScheduleCatalog: Send + Sync {
    /// Horario de un día de la semana (0 = domingo)
    async fn operating_hours(&self, restaurant_id: Uuid, weekday: u8) -> EngineResult<Option<TimeSlot>>;

    async fn table(&self, table_id: Uuid) -> EngineResult<Option<Table>>;

    /// Plato del catálogo, solo si pertenece a ese restaurante
    async fn catalog_dish(&self, restaurant_id: Uuid, dish_id: Uuid) -> EngineResult<Option<Dish>>;
}

/// Persistencia de reservas y reseñas
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Todas las reservas de la mesa, en cualquier estado
    async fn reservations_for_table(&self, table_id: Uuid) -> EngineResult<Vec<Reservation>>;

    /// Atómico por mesa: carga sus reservas, ejecuta `admit` e inserta
    async fn insert_reservation(&self, reservation: &Reservation, admit: AdmissionCheck<'_>) -> EngineResult<()>;

    async fn find_reservation(&self, id: Uuid) -> EngineResult<Option<Reservation>>;

    async fn reservations_by_user(&self, user_id: Uuid) -> EngineResult<Vec<Reservation>>;

    /// Sobrescritura idempotente del total
    async fn set_total_price(&self, id: Uuid, total_price: i64) -> EngineResult<()>;

    /// Atómico: cambia `from -> to` solo si el estado actual sigue siendo `from`.
    ///
    /// Con `admit`, la comprobación recibe las demás reservas de la mesa (sin
    /// la propia) bajo la misma serialización por mesa que la inserción.
    async fn update_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        admit: Option<AdmissionCheck<'_>>,
    ) -> EngineResult<Reservation>;

    /// Atómico por reserva: verifica el dueño, añade las líneas y guarda el
    /// total recalculado con `fold` sobre todas las líneas resultantes
    async fn append_line_items(
        &self,
        id: Uuid,
        owner: Uuid,
        items: &[LineItem],
        fold: TotalFold<'_>,
    ) -> EngineResult<Reservation>;

    /// Enlaza la reseña; falla con `ReviewAlreadyAttached` si ya hay una
    async fn attach_review(&self, id: Uuid, review_id: Uuid) -> EngineResult<()>;

    async fn find_review(&self, user_id: Uuid, reservation_id: Uuid) -> EngineResult<Option<Review>>;

    /// Atómico: inserta la reseña y la enlaza en su reserva. La unicidad por
    /// reserva se garantiza también al confirmar (`ReviewAlreadyExists`).
    async fn insert_review_linked(&self, review: &Review) -> EngineResult<()>;
}

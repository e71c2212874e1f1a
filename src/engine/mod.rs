//! # Motor de reservas
//!
//! Núcleo con invariantes reales del sistema:
//!
//! - [`availability`] - Decide si un intervalo se puede conceder (horario y solapamiento)
//! - [`ledger`] - Dueño de las reservas, sus estados y su precio total
//! - [`orders`] - Agrega platos pedidos a una reserva y recalcula el total
//! - [`reviews`] - Enlaza como máximo una reseña por reserva
//! - [`events`] - Eventos de observabilidad emitidos por cada operación
//! - [`store`] - Contratos con el catálogo y la persistencia
//!
//! ## Flujo
//!
//! ```text
//! reserva:  ScheduleCatalog ──► AvailabilityChecker ──► ReservationLedger (insert)
//! platos:   ReservationLedger (get) ──► OrderAggregator ──► ReservationLedger (total)
//! reseña:   ReservationLedger (get/owner) ──► ReviewLinker ──► ReservationLedger (link)
//! ```
//!
//! Cada operación multi-escritura se delega al almacenamiento como una unidad
//! atómica ([`store::LedgerStore`]); el motor no guarda estado mutable entre
//! peticiones.

pub mod availability;
pub mod error;
pub mod events;
pub mod ledger;
pub mod orders;
pub mod reviews;
pub mod store;

pub use availability::Decision;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventSink, RecordingSink, TracingSink};
pub use ledger::ReservationLedger;
pub use orders::{LineOutcome, OrderAggregator, OrderOutcome, RequestedLine, SkipReason};
pub use reviews::ReviewLinker;
pub use store::{LedgerStore, ScheduleCatalog};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::CommittedStatuses;

/// Parámetros de comportamiento del motor
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Límite para cada llamada al catálogo o a la persistencia
    pub upstream_timeout: Duration,
    /// Estados que ocupan la mesa en la comprobación de solapamiento
    pub committed: CommittedStatuses,
    /// Solo se pueden reseñar reservas `Completed`
    pub reviews_require_completed: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_millis(2000),
            committed: CommittedStatuses::default(),
            reviews_require_completed: true,
        }
    }
}

/// Dependencias compartidas por los componentes del motor
#[derive(Clone)]
pub(crate) struct Context {
    pub store: Arc<dyn LedgerStore>,
    pub catalog: Arc<dyn ScheduleCatalog>,
    pub sink: Arc<dyn EventSink>,
    pub settings: EngineSettings,
}

impl Context {
    /// Ejecuta una llamada externa con el timeout configurado
    ///
    /// Superar el límite se traduce a `UpstreamUnavailable`; no se reintenta.
    /// El límite cubre la llamada entera, confirmación incluida: si vence
    /// después de que el almacenamiento confirmara, la escritura persiste.
    pub async fn bounded<T, F>(&self, operation: &str, call: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.settings.upstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::upstream(
                operation,
                format!("timeout tras {} ms", self.settings.upstream_timeout.as_millis()),
            )),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        self.sink.emit(event);
    }
}

/// Punto de entrada del motor: agrupa los tres componentes sobre el mismo almacenamiento
#[derive(Clone)]
pub struct Engine {
    pub ledger: ReservationLedger,
    pub orders: OrderAggregator,
    pub reviews: ReviewLinker,
}

impl Engine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn ScheduleCatalog>,
        sink: Arc<dyn EventSink>,
        settings: EngineSettings,
    ) -> Self {
        let ctx = Context {
            store,
            catalog,
            sink,
            settings,
        };
        let ledger = ReservationLedger::new(ctx.clone());
        Self {
            orders: OrderAggregator::new(ledger.clone(), ctx.clone()),
            reviews: ReviewLinker::new(ledger.clone(), ctx),
            ledger,
        }
    }

    /// Motor con el sink de `tracing` por defecto
    pub fn with_tracing(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn ScheduleCatalog>,
        settings: EngineSettings,
    ) -> Self {
        Self::new(store, catalog, Arc::new(TracingSink), settings)
    }
}

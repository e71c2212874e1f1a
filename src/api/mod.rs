//! # Módulo API
//!
//! Capa HTTP fina sobre el motor de reservas.
//!
//! ## Módulos principales
//!
//! - [`reservation`] - Reservas (crear, listar, platos, cancelar, estado)
//! - [`review`] - Reseñas de reservas
//! - [`identity`] - Usuario de la petición
//! - [`errors`] - Manejo de errores de la aplicación

pub mod errors;
pub mod identity;
pub mod middleware;
pub mod reservation;
pub mod review;

// Re-exportar tipos comunes para facilitar su uso
pub use errors::{AppError, AppResult, ErrorResponse, ResultExt};

use actix_web::{get, web, HttpResponse, Responder};

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Configura todas las rutas de la API
///
/// ## Rutas configuradas
///
/// - `/reservations/*` - Ver [`reservation::routes`] y [`review::routes`]
/// - `/health`
///
/// # Ejemplo
///
/// ```no_run
/// use actix_web::{web, App};
/// use dining_reservation::api;
///
/// let app = App::new()
///     .configure(api::init_routes);
/// ```
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    reservation::routes(cfg);
    review::routes(cfg);
    cfg.service(health);
}

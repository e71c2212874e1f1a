//! # Identidad del usuario
//!
//! La identidad la emite un servicio externo (gateway de autenticación) y
//! llega ya validada en la cabecera `X-User-Id`.

use actix_web::HttpRequest;
use uuid::Uuid;

use super::{AppError, AppResult};

pub const USER_HEADER: &str = "x-user-id";

/// Extrae el usuario que hace la petición
///
/// # Errores
/// - `Unauthorized`: Si falta la cabecera o no es un UUID
pub fn extract_user(req: &HttpRequest) -> AppResult<Uuid> {
    let header = req
        .headers()
        .get(USER_HEADER)
        .ok_or(AppError::Unauthorized("Falta cabecera X-User-Id".to_string()))?;

    let raw = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Cabecera X-User-Id inválida".to_string()))?;

    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized("X-User-Id debe ser un UUID".to_string()))
}

/// Restaurante que actúa en el flujo de aprobación, también emitido por el gateway
pub const RESTAURANT_HEADER: &str = "x-restaurant-id";

/// Extrae el restaurante de la petición, si la envía
///
/// # Errores
/// - `Unauthorized`: La cabecera existe pero no es un UUID
pub fn extract_restaurant(req: &HttpRequest) -> AppResult<Option<Uuid>> {
    let Some(header) = req.headers().get(RESTAURANT_HEADER) else {
        return Ok(None);
    };

    header
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(Some)
        .ok_or(AppError::Unauthorized("X-Restaurant-Id debe ser un UUID".to_string()))
}

//! # Manejo de errores del API
//!
//! Traduce los errores del motor a respuestas HTTP con cuerpo
//! `{ "error", "message" }` y registra cada uno con el nivel adecuado.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use super::middleware::log_error_chain;
use crate::engine::EngineError;

/// Tipos de error de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    /// Error del motor de reservas, propagado sin modificar
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Error de validación con campo específico
    #[error("Error de validación en campo '{field}': {message}")]
    ValidationWithField {
        field: String,
        message: String,
    },

    /// Error de autorización simple
    #[error("No autorizado: {0}")]
    Unauthorized(String),

    /// Identificado, pero sin permiso para la operación
    #[error("Prohibido: {0}")]
    Forbidden(String),
}

impl AppError {
    /// Crea un error de validación con campo específico
    pub fn validation_field(field: &str, message: &str) -> Self {
        Self::ValidationWithField {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::ValidationWithField { .. } => "Error de validación",
            Self::Unauthorized(_) => "No autorizado",
            Self::Forbidden(_) => "Prohibido",
            Self::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::InvalidInterval { .. } => "Error de validación",
                EngineError::NotOwner { .. } | EngineError::NotRestaurantReservation { .. } => {
                    "Prohibido"
                }
                EngineError::NotFound { .. } => "No encontrado",
                EngineError::TableConflict { .. }
                | EngineError::ReviewAlreadyExists { .. }
                | EngineError::ReviewAlreadyAttached { .. } => "Conflicto",
                EngineError::OutsideOperatingHours { .. }
                | EngineError::InvalidStatusTransition { .. }
                | EngineError::ReviewNotAllowed { .. } => "Operación no permitida",
                EngineError::CatalogLookupFailed { .. } => "Error de catálogo",
                EngineError::UpstreamUnavailable { .. } => "Servicio no disponible",
            },
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationWithField { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::InvalidInterval { .. } => StatusCode::BAD_REQUEST,
                EngineError::NotOwner { .. } | EngineError::NotRestaurantReservation { .. } => {
                    StatusCode::FORBIDDEN
                }
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::TableConflict { .. }
                | EngineError::ReviewAlreadyExists { .. }
                | EngineError::ReviewAlreadyAttached { .. } => StatusCode::CONFLICT,
                EngineError::OutsideOperatingHours { .. }
                | EngineError::InvalidStatusTransition { .. }
                | EngineError::ReviewNotAllowed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::CatalogLookupFailed { .. } => StatusCode::BAD_GATEWAY,
                EngineError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Log detallado del error antes de responder
        match self {
            Self::Engine(e) if e.is_retryable() || status.is_server_error() => {
                log_error_chain(self, "engine");
            }
            Self::Unauthorized(reason) | Self::Forbidden(reason) => {
                tracing::warn!(status = %status, reason = %reason, "Unauthorized access attempt");
            }
            error => {
                tracing::info!(status = %status, error = %error, "Request rejected");
            }
        }

        let mut response = HttpResponse::build(status);
        if matches!(self, Self::Engine(e) if e.is_retryable()) {
            response.insert_header(("Retry-After", "1"));
        }
        response.json(ErrorResponse {
            error: self.title().to_string(),
            message: self.to_string(),
        })
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type AppResult<T> = Result<T, AppError>;

pub trait ResultExt<T> {
    fn map_err_validation(self, field: &str, message: &str) -> AppResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + 'static,
{
    fn map_err_validation(self, field: &str, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::validation_field(field, &format!("{}: {}", message, e)))
    }
}

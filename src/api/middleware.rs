//! # Utilidades de logging para errores
//!
//! Cada registro incluye la cadena completa de `source()` y si el llamante
//! puede reintentar la operación.

use std::error::Error as StdError;

use super::AppError;
use crate::config::ConfigError;
use crate::engine::EngineError;

/// Errores que saben si merece la pena repetir la operación
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        EngineError::is_retryable(self)
    }
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        matches!(self, AppError::Engine(e) if e.is_retryable())
    }
}

impl Retryable for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Mensajes de la cadena de errores, del más externo al más interno
pub fn error_chain(error: &(dyn StdError + 'static)) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        chain.push(err.to_string());
        current = err.source();
    }
    chain
}

/// Registra la cadena completa de errores con su contexto
pub fn log_error_chain<E>(error: &E, context: &str)
where
    E: StdError + Retryable + 'static,
{
    tracing::error!(
        context = %context,
        retryable = error.is_retryable(),
        error_chain = ?error_chain(error),
        "Error con cadena completa"
    );
}

/// Extension trait para Results que registra la cadena de errores al fallar
///
/// ```ignore
/// use dining_reservation::api::middleware::ErrorLogExt;
///
/// let repo = MongoRepo::init(uri, database)
///     .await
///     .log_error_context("connecting to MongoDB")?;
/// ```
pub trait ErrorLogExt<T, E> {
    fn log_error_context(self, context: &str) -> Result<T, E>;
}

impl<T, E> ErrorLogExt<T, E> for Result<T, E>
where
    E: StdError + Retryable + 'static,
{
    fn log_error_context(self, context: &str) -> Result<T, E> {
        if let Err(ref error) = self {
            log_error_chain(error, context);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("no se pudo crear la reserva")]
    struct CreateFailed {
        #[source]
        source: EngineError,
    }

    #[test]
    fn chain_walks_every_source() {
        let error = CreateFailed {
            source: EngineError::upstream("insert_reservation", "timeout tras 2000 ms"),
        };

        let chain = error_chain(&error);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], "no se pudo crear la reserva");
        assert!(chain[1].contains("insert_reservation"));
    }

    #[test]
    fn only_upstream_failures_are_retryable() {
        let upstream = AppError::from(EngineError::upstream("get_table", "timeout"));
        let conflict = AppError::from(EngineError::TableConflict {
            table_id: "t1".to_string(),
        });

        assert!(upstream.is_retryable());
        assert!(!conflict.is_retryable());
        assert!(!AppError::Unauthorized("sin cabecera".to_string()).is_retryable());
    }
}

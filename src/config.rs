//! # Configuración
//!
//! Todo se lee de variables de entorno (cargadas antes desde `.env` con
//! `dotenvy`). Un valor presente pero mal formado detiene el arranque.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::db::models::CommittedStatuses;
use crate::engine::EngineSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Valor inválido para {var}: '{value}' ({expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub storage: StorageBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub engine: EngineSettings,
}

impl AppConfig {
    /// Lee la configuración del entorno del proceso
    ///
    /// # Variables de entorno
    ///
    /// - `BIND_ADDRESS` (default: 0.0.0.0:8080)
    /// - `STORAGE_BACKEND`: `mongodb` | `memory` (default: mongodb)
    /// - `MONGODB_URI` (default: mongodb://localhost:27017)
    /// - `MONGODB_DATABASE` (default: dining_reservation)
    /// - `UPSTREAM_TIMEOUT_MS` (default: 2000)
    /// - `PENDING_HOLDS_TABLE` (default: false)
    /// - `REVIEWS_REQUIRE_COMPLETED` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero con una fuente de variables arbitraria
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage = match lookup("STORAGE_BACKEND").as_deref() {
            None | Some("mongodb") => StorageBackend::MongoDb,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                    expected: "mongodb | memory",
                })
            }
        };

        let defaults = EngineSettings::default();
        let upstream_timeout = match lookup("UPSTREAM_TIMEOUT_MS") {
            None => defaults.upstream_timeout,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "UPSTREAM_TIMEOUT_MS",
                        value: raw,
                        expected: "milisegundos > 0",
                    })
                }
            },
        };

        let committed = if parse_flag(&lookup, "PENDING_HOLDS_TABLE", false)? {
            CommittedStatuses::HOLDING
        } else {
            CommittedStatuses::CONFIRMED
        };

        Ok(AppConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            storage,
            mongodb_uri: lookup("MONGODB_URI")
                .unwrap_or_else(|| "mongodb://localhost:27017".to_string()),
            mongodb_database: lookup("MONGODB_DATABASE")
                .unwrap_or_else(|| "dining_reservation".to_string()),
            engine: EngineSettings {
                upstream_timeout,
                committed,
                reviews_require_completed: parse_flag(&lookup, "REVIEWS_REQUIRE_COMPLETED", true)?,
            },
        })
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw,
                expected: "true | false",
            }),
        },
    }
}

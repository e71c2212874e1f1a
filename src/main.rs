//! # Dining Reservation Server
//!
//! Servidor web del motor de reservas construido con Rust, Actix Web y MongoDB.
//!
//! ## Configuración
//!
//! El servidor se configura mediante variables de entorno (archivo `.env`):
//!
//! ```env
//! # Base de datos MongoDB (replica set: las reservas usan transacciones)
//! MONGODB_URI=mongodb://localhost:27017/?replicaSet=rs0
//! MONGODB_DATABASE=dining_reservation
//!
//! # Almacenamiento: mongodb | memory
//! STORAGE_BACKEND=mongodb
//!
//! # Servidor
//! BIND_ADDRESS=0.0.0.0:8080
//!
//! # Motor
//! UPSTREAM_TIMEOUT_MS=2000
//! PENDING_HOLDS_TABLE=false
//! REVIEWS_REQUIRE_COMPLETED=true
//!
//! # Logging
//! RUST_LOG=debug,mongodb=info
//! ```
//!
//! ## Ejecución
//!
//! ```bash
//! # 1. MongoDB como replica set de un nodo
//! # Docker: docker run -d --name mongo -p 27017:27017 mongo:latest --replSet rs0
//! #         docker exec mongo mongosh --eval "rs.initiate()"
//!
//! # 2. Compilar y ejecutar
//! cargo run
//!
//! # Sin base de datos
//! STORAGE_BACKEND=memory cargo run
//! ```

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use dining_reservation::api::{self, middleware::ErrorLogExt};
use dining_reservation::config::{AppConfig, StorageBackend};
use dining_reservation::db::{MemoryStore, MongoRepo};
use dining_reservation::engine::Engine;

/// Construye el motor sobre el almacenamiento configurado
///
/// Con MongoDB, un fallo creando índices no es fatal (se registra y se sigue).
async fn build_engine(config: &AppConfig) -> std::io::Result<Engine> {
    match config.storage {
        StorageBackend::MongoDb => {
            let repo = MongoRepo::init(&config.mongodb_uri, &config.mongodb_database)
                .await
                .log_error_context("connecting to MongoDB")
                .map_err(|e| std::io::Error::other(format!("Error de MongoDB: {}", e)))?;

            if let Err(e) = repo.create_indexes().await {
                tracing::warn!("Advertencia creando índices: {}", e);
            }

            let repo = Arc::new(repo);
            Ok(Engine::with_tracing(repo.clone(), repo, config.engine))
        }
        StorageBackend::Memory => {
            tracing::warn!("Usando almacenamiento en memoria: los datos se pierden al reiniciar");
            let store = Arc::new(MemoryStore::new());
            Ok(Engine::with_tracing(store.clone(), store, config.engine))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Configurar sistema de logging con tracing
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["dining_reservation=debug", "mongodb=info"] {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Directiva de logging inválida '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()
        .log_error_context("loading configuration")
        .map_err(std::io::Error::other)?;

    tracing::info!(storage = ?config.storage, "Iniciando Dining Reservation Server...");

    let engine = build_engine(&config).await?;

    tracing::info!("Servidor iniciando en {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(engine.clone()))
            .wrap(Logger::default())
            .configure(api::init_routes)
    })
    .bind(&config.bind_address)?
    .run()
    .await
}

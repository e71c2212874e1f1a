//! # Dining Reservation
//!
//! Motor de reservas de mesas para restaurantes: admisión de franjas
//! horarias sin dobles reservas, pedidos de platos con precio congelado y una
//! reseña por reserva.
//!
//! ## Arquitectura
//!
//! ```text
//! API REST (Actix Web)          api::*
//!     ↓
//! Motor de reservas             engine::{ledger, orders, reviews, availability}
//!     ↓ LedgerStore / ScheduleCatalog
//! MongoDB (transacciones)       db::mongodb
//! o memoria                     db::memory
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod engine;

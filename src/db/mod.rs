// src/db/mod.rs
pub mod memory;
pub mod models;
pub mod mongodb;

pub use self::memory::MemoryStore;
pub use self::mongodb::MongoRepo;

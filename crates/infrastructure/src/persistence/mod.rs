//! SQLite persistence for experiments

mod connection;
mod experiment_store;
pub mod migrations;

pub use connection::{ConnectionPool, DatabaseError, create_pool};
pub use experiment_store::SqliteExperimentStore;

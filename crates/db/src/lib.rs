pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{seed, verify_seed, SeedResult, VerificationResult};
pub use repositories::{
    CatalogRepository, InMemoryCatalogRepository, InMemorySessionRepository, RepositoryError,
    SessionRepository, SqlCatalogRepository, SqlSessionRepository, StockReservation,
};

use async_trait::async_trait;
use thiserror::Error;

use cartly_core::domain::conversation::{ConversationTurn, SessionId};
use cartly_core::domain::product::{Brand, CatalogEntry, Category, Product, ProductId};
use cartly_core::query::SearchFilter;

pub mod catalog;
pub mod memory;
pub mod session;

pub use catalog::SqlCatalogRepository;
pub use memory::{InMemoryCatalogRepository, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Outcome of the atomic check-and-decrement on a product's stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockReservation {
    Reserved,
    InsufficientStock { available: u32 },
    NotFound,
}

/// Read access plus the single stock-mutation path for the catalog.
/// `reserve_stock` is the only writer of `stock_quantity` in the whole
/// system; search and the agent never touch it.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// The SQL backend translates the filter into a parameterized read
    /// (`cartly_core::query::translate`); the in-memory backend applies
    /// the same predicates directly.
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CatalogEntry>, RepositoryError>;

    /// Active products only; inactive ids read as absent.
    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError>;

    async fn check_stock(&self, id: ProductId) -> Result<Option<u32>, RepositoryError>;

    /// Decrements stock by `quantity` only if at least that much remains,
    /// atomically with respect to every concurrent reservation for the
    /// same product. No partial decrement on failure.
    async fn reserve_stock(
        &self,
        id: ProductId,
        quantity: u32,
    ) -> Result<StockReservation, RepositoryError>;

    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError>;
    async fn save_category(&self, category: Category) -> Result<(), RepositoryError>;
    async fn save_product(&self, product: Product) -> Result<(), RepositoryError>;
}

/// Per-session turn history with FIFO eviction past `cap`. Eviction is
/// silent and irreversible; sessions are never torn down here.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn append_turn(
        &self,
        session: &SessionId,
        turn: ConversationTurn,
        cap: usize,
    ) -> Result<(), RepositoryError>;

    /// Retained turns in order, most recent last.
    async fn recent_turns(
        &self,
        session: &SessionId,
        cap: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError>;
}

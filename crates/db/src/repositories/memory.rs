use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use cartly_core::domain::conversation::{ConversationTurn, SessionId};
use cartly_core::domain::product::{Brand, CatalogEntry, Category, Product, ProductId};
use cartly_core::query::{SearchFilter, SortMode};

use super::{
    CatalogRepository, RepositoryError, SessionRepository, StockReservation,
};

/// Test and fixture double for the SQL catalog. The write lock serializes
/// `reserve_stock`, giving the same check-and-decrement atomicity the SQL
/// backend gets from SQLite's single writer.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    state: RwLock<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    brands: HashMap<i64, Brand>,
    categories: HashMap<i64, Category>,
    products: HashMap<i64, Product>,
}

impl CatalogState {
    fn entry(&self, product: &Product) -> Result<CatalogEntry, RepositoryError> {
        let brand = self.brands.get(&product.brand_id.0).ok_or_else(|| {
            RepositoryError::Decode(format!("product {} references unknown brand", product.id.0))
        })?;
        let category = self.categories.get(&product.category_id.0).ok_or_else(|| {
            RepositoryError::Decode(format!("product {} references unknown category", product.id.0))
        })?;
        Ok(CatalogEntry {
            product: product.clone(),
            brand_name: brand.name.clone(),
            category_name: category.name.clone(),
        })
    }

    fn matches(&self, product: &Product, filter: &SearchFilter) -> bool {
        if !product.active {
            return false;
        }
        if let Some(name) = &filter.name {
            if !product.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(brand) = &filter.brand {
            let matched = self
                .brands
                .get(&product.brand_id.0)
                .is_some_and(|b| b.name.to_lowercase().contains(&brand.to_lowercase()));
            if !matched {
                return false;
            }
        }
        if let Some(category) = &filter.category {
            let matched = self
                .categories
                .get(&product.category_id.0)
                .is_some_and(|c| c.name.to_lowercase().contains(&category.to_lowercase()));
            if !matched {
                return false;
            }
        }
        if let Some(min_price) = filter.min_price {
            if let Ok(bound) = Decimal::try_from(min_price) {
                if product.unit_price < bound {
                    return false;
                }
            }
        }
        if let Some(max_price) = filter.max_price {
            if let Ok(bound) = Decimal::try_from(max_price) {
                if product.unit_price > bound {
                    return false;
                }
            }
        }
        if let Some(age_months) = filter.age_months {
            if !product.age_range.is_some_and(|range| range.contains(age_months)) {
                return false;
            }
        }
        if filter.discount_only && product.discount_pct <= Decimal::ZERO {
            return false;
        }
        if filter.in_stock_only && product.stock_quantity == 0 {
            return false;
        }
        true
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CatalogEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut hits = state
            .products
            .values()
            .filter(|product| state.matches(product, filter))
            .map(|product| state.entry(product))
            .collect::<Result<Vec<_>, _>>()?;

        match filter.sort {
            SortMode::PriceAscending => hits.sort_by(|a, b| {
                a.product.unit_price.cmp(&b.product.unit_price).then(a.product.id.0.cmp(&b.product.id.0))
            }),
            SortMode::DiscountFirst => hits.sort_by(|a, b| {
                b.product
                    .discount_pct
                    .cmp(&a.product.discount_pct)
                    .then(a.product.unit_price.cmp(&b.product.unit_price))
                    .then(a.product.id.0.cmp(&b.product.id.0))
            }),
            SortMode::StockFirst => hits.sort_by(|a, b| {
                b.product
                    .stock_quantity
                    .cmp(&a.product.stock_quantity)
                    .then(a.product.unit_price.cmp(&b.product.unit_price))
                    .then(a.product.id.0.cmp(&b.product.id.0))
            }),
        }

        hits.truncate(filter.clamped_limit() as usize);
        Ok(hits)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError> {
        let state = self.state.read().await;
        match state.products.get(&id.0) {
            Some(product) if product.active => state.entry(product).map(Some),
            _ => Ok(None),
        }
    }

    async fn check_stock(&self, id: ProductId) -> Result<Option<u32>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .products
            .get(&id.0)
            .filter(|product| product.active)
            .map(|product| product.stock_quantity))
    }

    async fn reserve_stock(
        &self,
        id: ProductId,
        quantity: u32,
    ) -> Result<StockReservation, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&id.0).filter(|product| product.active) else {
            return Ok(StockReservation::NotFound);
        };
        if product.stock_quantity < quantity {
            return Ok(StockReservation::InsufficientStock { available: product.stock_quantity });
        }
        product.stock_quantity -= quantity;
        Ok(StockReservation::Reserved)
    }

    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError> {
        self.state.write().await.brands.insert(brand.id.0, brand);
        Ok(())
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        self.state.write().await.categories.insert(category.id.0, category);
        Ok(())
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        self.state.write().await.products.insert(product.id.0, product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, VecDeque<ConversationTurn>>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn append_turn(
        &self,
        session: &SessionId,
        turn: ConversationTurn,
        cap: usize,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session.0.clone()).or_default();
        turns.push_back(turn);
        while turns.len() > cap {
            turns.pop_front();
        }
        Ok(())
    }

    async fn recent_turns(
        &self,
        session: &SessionId,
        cap: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let Some(turns) = sessions.get(&session.0) else {
            return Ok(Vec::new());
        };
        let skip = turns.len().saturating_sub(cap);
        Ok(turns.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use cartly_core::domain::conversation::{ConversationTurn, SessionId};
    use cartly_core::domain::product::{
        AgeRange, Brand, BrandId, Category, CategoryId, Product, ProductId,
    };
    use cartly_core::query::SearchFilter;

    use super::{InMemoryCatalogRepository, InMemorySessionRepository};
    use crate::repositories::{CatalogRepository, SessionRepository, StockReservation};

    async fn seeded(stock: u32) -> Arc<InMemoryCatalogRepository> {
        let repository = Arc::new(InMemoryCatalogRepository::default());
        repository
            .save_brand(Brand {
                id: BrandId(1),
                name: "Nordmilch".to_string(),
                country_of_origin: "Germany".to_string(),
                premium: false,
            })
            .await
            .expect("brand");
        repository
            .save_category(Category { id: CategoryId(1), name: "Formula".to_string() })
            .await
            .expect("category");
        repository
            .save_product(Product {
                id: ProductId(1),
                name: "Toddler Gold 2".to_string(),
                brand_id: BrandId(1),
                category_id: CategoryId(1),
                unit_price: dec!(220.00),
                package_size_ml: 900,
                age_range: Some(AgeRange { from_months: 12, to_months: 24 }),
                discount_pct: dec!(0),
                stock_quantity: stock,
                active: true,
            })
            .await
            .expect("product");
        repository
    }

    #[tokio::test]
    async fn concurrent_unit_orders_never_oversell() {
        const STOCK: u32 = 5;
        const CALLERS: usize = 12;

        let repository = seeded(STOCK).await;
        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let repository = Arc::clone(&repository);
            handles.push(tokio::spawn(async move {
                repository.reserve_stock(ProductId(1), 1).await.expect("reserve")
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.expect("join") == StockReservation::Reserved {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, STOCK);
        assert_eq!(
            repository.check_stock(ProductId(1)).await.expect("stock"),
            Some(0)
        );
    }

    #[tokio::test]
    async fn last_units_contention_exactly_one_winner() {
        // stock = 3, two concurrent orders of 2: one wins, one observes
        // the single remaining unit.
        let repository = seeded(3).await;
        let first = {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move { repository.reserve_stock(ProductId(1), 2).await })
        };
        let second = {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move { repository.reserve_stock(ProductId(1), 2).await })
        };

        let outcomes = [
            first.await.expect("join").expect("reserve"),
            second.await.expect("join").expect("reserve"),
        ];
        let wins =
            outcomes.iter().filter(|outcome| **outcome == StockReservation::Reserved).count();
        let shortfalls = outcomes
            .iter()
            .filter(|outcome| {
                matches!(outcome, StockReservation::InsufficientStock { available: 1 })
            })
            .count();

        assert_eq!(wins, 1);
        assert_eq!(shortfalls, 1);
        assert_eq!(repository.check_stock(ProductId(1)).await.expect("stock"), Some(1));
    }

    #[tokio::test]
    async fn search_filters_and_sorts_like_the_sql_backend() {
        let repository = seeded(4).await;
        let hits = repository.search(&SearchFilter::by_name("gold")).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].brand_name, "Nordmilch");

        let misses = repository.search(&SearchFilter::by_name("platinum")).await.expect("search");
        assert!(misses.is_empty());

        let by_age = repository.search(&SearchFilter::for_age(18)).await.expect("search");
        assert_eq!(by_age.len(), 1);
        let out_of_range = repository.search(&SearchFilter::for_age(30)).await.expect("search");
        assert!(out_of_range.is_empty());
    }

    #[tokio::test]
    async fn session_store_evicts_fifo_and_isolates() {
        let store = InMemorySessionRepository::default();
        let session = SessionId("chat-1".to_string());
        for index in 0..5 {
            store
                .append_turn(&session, ConversationTurn::user(format!("m{index}")), 3)
                .await
                .expect("append");
        }

        let turns = store.recent_turns(&session, 3).await.expect("read");
        let contents: Vec<_> = turns.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let other = store
            .recent_turns(&SessionId("chat-2".to_string()), 3)
            .await
            .expect("read");
        assert!(other.is_empty());
    }
}

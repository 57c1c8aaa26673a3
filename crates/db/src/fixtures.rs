//! Deterministic demo catalog used by `cartly seed` and the integration
//! tests. Seeding is idempotent: rows are upserted by fixed ids.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use cartly_core::domain::product::{
    AgeRange, Brand, BrandId, Category, CategoryId, Product, ProductId,
};

use crate::repositories::{CatalogRepository, RepositoryError, SqlCatalogRepository};
use crate::DbPool;

struct BrandSeed {
    id: i64,
    name: &'static str,
    country: &'static str,
    premium: bool,
}

struct CategorySeed {
    id: i64,
    name: &'static str,
}

struct ProductSeed {
    id: i64,
    name: &'static str,
    brand_id: i64,
    category_id: i64,
    unit_price: &'static str,
    package_size_ml: u32,
    age: Option<(u32, u32)>,
    discount_pct: &'static str,
    stock: u32,
}

const SEED_BRANDS: &[BrandSeed] = &[
    BrandSeed { id: 1, name: "Nordmilch", country: "Germany", premium: true },
    BrandSeed { id: 2, name: "Meadow Farm", country: "Netherlands", premium: false },
    BrandSeed { id: 3, name: "Alpine Pure", country: "Switzerland", premium: true },
];

const SEED_CATEGORIES: &[CategorySeed] = &[
    CategorySeed { id: 1, name: "Infant formula" },
    CategorySeed { id: 2, name: "Follow-on formula" },
    CategorySeed { id: 3, name: "Fresh milk" },
];

const SEED_PRODUCTS: &[ProductSeed] = &[
    ProductSeed {
        id: 1,
        name: "Nordmilch Infant Start 1",
        brand_id: 1,
        category_id: 1,
        unit_price: "185.00",
        package_size_ml: 800,
        age: Some((0, 6)),
        discount_pct: "0",
        stock: 24,
    },
    ProductSeed {
        id: 2,
        name: "Nordmilch Toddler Gold 2",
        brand_id: 1,
        category_id: 2,
        unit_price: "210.00",
        package_size_ml: 900,
        age: Some((6, 12)),
        discount_pct: "10",
        stock: 17,
    },
    ProductSeed {
        id: 3,
        name: "Meadow Farm Grow 3",
        brand_id: 2,
        category_id: 2,
        unit_price: "149.50",
        package_size_ml: 900,
        age: Some((12, 36)),
        discount_pct: "5",
        stock: 40,
    },
    ProductSeed {
        id: 4,
        name: "Meadow Farm Fresh Whole Milk",
        brand_id: 2,
        category_id: 3,
        unit_price: "32.00",
        package_size_ml: 1000,
        age: None,
        discount_pct: "0",
        stock: 120,
    },
    ProductSeed {
        id: 5,
        name: "Alpine Pure Junior 4",
        brand_id: 3,
        category_id: 2,
        unit_price: "265.00",
        package_size_ml: 800,
        age: Some((12, 24)),
        discount_pct: "15",
        stock: 8,
    },
    ProductSeed {
        id: 6,
        name: "Alpine Pure Organic Fresh",
        brand_id: 3,
        category_id: 3,
        unit_price: "54.00",
        package_size_ml: 1000,
        age: None,
        discount_pct: "0",
        stock: 0,
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub brands: usize,
    pub categories: usize,
    pub products: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub ok: bool,
    pub problems: Vec<String>,
}

pub async fn seed(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let repository = SqlCatalogRepository::new(pool.clone());

    for brand in SEED_BRANDS {
        repository
            .save_brand(Brand {
                id: BrandId(brand.id),
                name: brand.name.to_string(),
                country_of_origin: brand.country.to_string(),
                premium: brand.premium,
            })
            .await?;
    }
    for category in SEED_CATEGORIES {
        repository
            .save_category(Category { id: CategoryId(category.id), name: category.name.to_string() })
            .await?;
    }
    for product in SEED_PRODUCTS {
        repository
            .save_product(Product {
                id: ProductId(product.id),
                name: product.name.to_string(),
                brand_id: BrandId(product.brand_id),
                category_id: CategoryId(product.category_id),
                unit_price: parse_seed_decimal(product.unit_price)?,
                package_size_ml: product.package_size_ml,
                age_range: product
                    .age
                    .map(|(from, to)| AgeRange { from_months: from, to_months: to }),
                discount_pct: parse_seed_decimal(product.discount_pct)?,
                stock_quantity: product.stock,
                active: true,
            })
            .await?;
    }

    Ok(SeedResult {
        brands: SEED_BRANDS.len(),
        categories: SEED_CATEGORIES.len(),
        products: SEED_PRODUCTS.len(),
    })
}

pub async fn verify_seed(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
    let mut problems = Vec::new();

    for (table, expected) in [
        ("brands", SEED_BRANDS.len() as i64),
        ("categories", SEED_CATEGORIES.len() as i64),
        ("products", SEED_PRODUCTS.len() as i64),
    ] {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}"))
            .fetch_one(pool)
            .await?
            .get("count");
        if count < expected {
            problems.push(format!("table `{table}` holds {count} rows, expected >= {expected}"));
        }
    }

    let orphans: i64 = sqlx::query(
        "SELECT COUNT(*) AS count FROM products p \
         LEFT JOIN brands b ON b.id = p.brand_id \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE b.id IS NULL OR c.id IS NULL",
    )
    .fetch_one(pool)
    .await?
    .get("count");
    if orphans > 0 {
        problems.push(format!("{orphans} products reference missing brands or categories"));
    }

    Ok(VerificationResult { ok: problems.is_empty(), problems })
}

fn parse_seed_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("seed decimal `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use cartly_core::domain::product::ProductId;
    use cartly_core::query::SearchFilter;

    use super::{seed, verify_seed};
    use crate::migrations::run_pending;
    use crate::repositories::{CatalogRepository, SqlCatalogRepository};
    use crate::connect_with_settings;

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let first = seed(&pool).await.expect("seed");
        let second = seed(&pool).await.expect("reseed");
        assert_eq!(first, second);

        let verification = verify_seed(&pool).await.expect("verify");
        assert!(verification.ok, "unexpected problems: {:?}", verification.problems);
    }

    #[tokio::test]
    async fn seeded_catalog_answers_age_queries() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        seed(&pool).await.expect("seed");

        let repository = SqlCatalogRepository::new(pool);
        let hits = repository.search(&SearchFilter::for_age(18)).await.expect("search");
        let ids: Vec<_> = hits.iter().map(|entry| entry.product.id).collect();
        assert!(ids.contains(&ProductId(3)));
        assert!(ids.contains(&ProductId(5)));
        assert_eq!(ids.len(), 2);
    }
}

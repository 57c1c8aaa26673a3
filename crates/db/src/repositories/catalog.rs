use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cartly_core::domain::product::{
    AgeRange, Brand, BrandId, CatalogEntry, Category, CategoryId, Product, ProductId,
};
use cartly_core::query::{translate, ParameterizedQuery, QueryValue, SearchFilter, CATALOG_COLUMNS};

use super::{CatalogRepository, RepositoryError, StockReservation};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Executes an already-translated catalog read. Values are bound
    /// positionally; the SQL text never carries filter content.
    pub async fn read_products(
        &self,
        query: &ParameterizedQuery,
    ) -> Result<Vec<CatalogEntry>, RepositoryError> {
        let rows = Self::bind_params(sqlx::query(&query.sql), &query.params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(entry_from_row).collect()
    }

    fn bind_params<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        params: &'q [QueryValue],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        for param in params {
            query = match param {
                QueryValue::Text(value) => query.bind(value),
                QueryValue::Integer(value) => query.bind(value),
                QueryValue::Real(value) => query.bind(value),
            };
        }
        query
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CatalogEntry>, RepositoryError> {
        self.read_products(&translate(filter)).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogEntry>, RepositoryError> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} \
             FROM products p \
             JOIN brands b ON b.id = p.brand_id \
             JOIN categories c ON c.id = p.category_id \
             WHERE p.id = ? AND p.active = 1"
        );
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;
        row.map(entry_from_row).transpose()
    }

    async fn check_stock(&self, id: ProductId) -> Result<Option<u32>, RepositoryError> {
        let row =
            sqlx::query("SELECT stock_quantity FROM products WHERE id = ? AND active = 1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|row| {
            let stock: i64 = row.try_get("stock_quantity").map_err(RepositoryError::Database)?;
            u32::try_from(stock)
                .map_err(|_| RepositoryError::Decode(format!("negative stock for product {}", id.0)))
        })
        .transpose()
    }

    async fn reserve_stock(
        &self,
        id: ProductId,
        quantity: u32,
    ) -> Result<StockReservation, RepositoryError> {
        // Single conditional UPDATE: SQLite serializes writers, so the
        // check and the decrement cannot interleave with another order.
        let result = sqlx::query(
            "UPDATE products \
             SET stock_quantity = stock_quantity - ? \
             WHERE id = ? AND active = 1 AND stock_quantity >= ?",
        )
        .bind(i64::from(quantity))
        .bind(id.0)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(StockReservation::Reserved);
        }

        // Nothing changed; a follow-up read tells insufficient apart from
        // missing/inactive.
        match self.check_stock(id).await? {
            Some(available) => Ok(StockReservation::InsufficientStock { available }),
            None => Ok(StockReservation::NotFound),
        }
    }

    async fn save_brand(&self, brand: Brand) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO brands (id, name, country_of_origin, premium) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, \
                country_of_origin = excluded.country_of_origin, \
                premium = excluded.premium",
        )
        .bind(brand.id.0)
        .bind(&brand.name)
        .bind(&brand.country_of_origin)
        .bind(brand.premium)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO categories (id, name) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(category.id.0)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (
                id, name, brand_id, category_id, unit_price, package_size_ml,
                age_from_months, age_to_months, discount_pct, stock_quantity, active
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, \
                brand_id = excluded.brand_id, \
                category_id = excluded.category_id, \
                unit_price = excluded.unit_price, \
                package_size_ml = excluded.package_size_ml, \
                age_from_months = excluded.age_from_months, \
                age_to_months = excluded.age_to_months, \
                discount_pct = excluded.discount_pct, \
                stock_quantity = excluded.stock_quantity, \
                active = excluded.active",
        )
        .bind(product.id.0)
        .bind(&product.name)
        .bind(product.brand_id.0)
        .bind(product.category_id.0)
        .bind(product.unit_price.to_string())
        .bind(i64::from(product.package_size_ml))
        .bind(product.age_range.map(|range| i64::from(range.from_months)))
        .bind(product.age_range.map(|range| i64::from(range.to_months)))
        .bind(product.discount_pct.to_string())
        .bind(i64::from(product.stock_quantity))
        .bind(product.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn entry_from_row(row: SqliteRow) -> Result<CatalogEntry, RepositoryError> {
    let age_from: Option<i64> = row.try_get("age_from_months")?;
    let age_to: Option<i64> = row.try_get("age_to_months")?;
    let age_range = match (age_from, age_to) {
        (Some(from), Some(to)) => Some(AgeRange {
            from_months: decode_u32("age_from_months", from)?,
            to_months: decode_u32("age_to_months", to)?,
        }),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "age range bounds must both be present or both absent".to_string(),
            ))
        }
    };

    let stock: i64 = row.try_get("stock_quantity")?;

    Ok(CatalogEntry {
        product: Product {
            id: ProductId(row.try_get("id")?),
            name: row.try_get("name")?,
            brand_id: BrandId(row.try_get("brand_id")?),
            category_id: CategoryId(row.try_get("category_id")?),
            unit_price: decode_decimal("unit_price", row.try_get("unit_price_text")?)?,
            package_size_ml: decode_u32("package_size_ml", row.try_get("package_size_ml")?)?,
            age_range,
            discount_pct: decode_decimal("discount_pct", row.try_get("discount_pct_text")?)?,
            stock_quantity: decode_u32("stock_quantity", stock)?,
            active: row.try_get("active")?,
        },
        brand_name: row.try_get("brand_name")?,
        category_name: row.try_get("category_name")?,
    })
}

fn decode_decimal(field: &str, raw: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&raw)
        .map_err(|error| RepositoryError::Decode(format!("{field} `{raw}` is not a decimal: {error}")))
}

fn decode_u32(field: &str, raw: i64) -> Result<u32, RepositoryError> {
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("{field} `{raw}` is out of range")))
}

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use cartly_core::domain::product::CatalogEntry;
use cartly_core::errors::AssistantError;
use cartly_core::query::SearchFilter;
use cartly_core::ProductId;
use cartly_db::repositories::{CatalogRepository, RepositoryError};

use crate::registry::Tool;
use crate::schema::{ArgKind, ArgSpec, ToolSchema};

/// Flattened search result the agent composes replies from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductHit {
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub unit_price: Decimal,
    pub effective_price: Decimal,
    pub discount_pct: Decimal,
    pub package_size_ml: u32,
    pub age_from_months: Option<u32>,
    pub age_to_months: Option<u32>,
    pub stock_quantity: u32,
}

impl From<CatalogEntry> for ProductHit {
    fn from(entry: CatalogEntry) -> Self {
        let product = entry.product;
        Self {
            product_id: product.id.0,
            name: product.name.clone(),
            brand: entry.brand_name,
            category: entry.category_name,
            effective_price: product.effective_price(),
            unit_price: product.unit_price,
            discount_pct: product.discount_pct,
            package_size_ml: product.package_size_ml,
            age_from_months: product.age_range.map(|range| range.from_months),
            age_to_months: product.age_range.map(|range| range.to_months),
            stock_quantity: product.stock_quantity,
        }
    }
}

fn repo_error(error: RepositoryError) -> AssistantError {
    AssistantError::internal(error.to_string())
}

/// Read-only catalog capability. Stateless: every call carries its whole
/// filter, nothing is remembered between calls.
pub struct SearchService<R: CatalogRepository> {
    repository: Arc<R>,
}

impl<R: CatalogRepository> SearchService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<ProductHit>, AssistantError> {
        let entries = self.repository.search(filter).await.map_err(repo_error)?;
        debug!(hits = entries.len(), "catalog search completed");
        Ok(entries.into_iter().map(ProductHit::from).collect())
    }

    /// Products whose age range contains `months`, tightest range first,
    /// price ascending within equal tightness.
    pub async fn recommend_by_age(&self, months: u32) -> Result<Vec<ProductHit>, AssistantError> {
        let filter = SearchFilter::for_age(months);
        let entries = self.repository.search(&filter).await.map_err(repo_error)?;

        let mut hits: Vec<(u32, ProductHit)> = entries
            .into_iter()
            .filter_map(|entry| {
                let span = entry.product.age_range.as_ref()?.span();
                Some((span, ProductHit::from(entry)))
            })
            .collect();
        hits.sort_by(|(span_a, hit_a), (span_b, hit_b)| {
            span_a
                .cmp(span_b)
                .then(hit_a.effective_price.cmp(&hit_b.effective_price))
                .then(hit_a.product_id.cmp(&hit_b.product_id))
        });
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    pub async fn check_stock(&self, product_id: ProductId) -> Result<u32, AssistantError> {
        self.repository
            .check_stock(product_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| AssistantError::not_found(format!("product {}", product_id.0)))
    }
}

/// `catalog_search`: parameterized catalog query, all filters optional.
pub struct CatalogSearchTool<R: CatalogRepository> {
    service: Arc<SearchService<R>>,
}

impl<R: CatalogRepository> CatalogSearchTool<R> {
    pub fn new(service: Arc<SearchService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: CatalogRepository + 'static> Tool for CatalogSearchTool<R> {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "catalog_search",
            "Search the product catalog by name, brand, category, price, age suitability, discount, and stock",
            vec![
                ArgSpec::optional("name", ArgKind::String),
                ArgSpec::optional("brand", ArgKind::String),
                ArgSpec::optional("category", ArgKind::String),
                ArgSpec::optional("min_price", ArgKind::Number),
                ArgSpec::optional("max_price", ArgKind::Number),
                ArgSpec::optional("age_months", ArgKind::Integer),
                ArgSpec::optional("discount_only", ArgKind::Boolean),
                ArgSpec::optional("in_stock_only", ArgKind::Boolean),
                ArgSpec::optional("sort", ArgKind::String),
                ArgSpec::optional("limit", ArgKind::Integer),
            ],
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, AssistantError> {
        let filter: SearchFilter = serde_json::from_value(args)
            .map_err(|error| AssistantError::InvalidRequest { message: error.to_string() })?;
        let hits = self.service.search(&filter).await?;
        Ok(json!({ "hits": hits }))
    }
}

/// `recommend_by_age`: age-appropriate products, tightest fit first.
pub struct RecommendByAgeTool<R: CatalogRepository> {
    service: Arc<SearchService<R>>,
}

impl<R: CatalogRepository> RecommendByAgeTool<R> {
    pub fn new(service: Arc<SearchService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: CatalogRepository + 'static> Tool for RecommendByAgeTool<R> {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "recommend_by_age",
            "Recommend products suitable for a child of the given age in months",
            vec![ArgSpec::required("age_months", ArgKind::Integer)],
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, AssistantError> {
        let months = required_u32(&args, "age_months")?;
        let hits = self.service.recommend_by_age(months).await?;
        Ok(json!({ "hits": hits }))
    }
}

/// `check_stock`: remaining units for one product.
pub struct CheckStockTool<R: CatalogRepository> {
    service: Arc<SearchService<R>>,
}

impl<R: CatalogRepository> CheckStockTool<R> {
    pub fn new(service: Arc<SearchService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: CatalogRepository + 'static> Tool for CheckStockTool<R> {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "check_stock",
            "Report how many units of a product are in stock",
            vec![ArgSpec::required("product_id", ArgKind::Integer)],
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, AssistantError> {
        let product_id = required_i64(&args, "product_id")?;
        let available = self.service.check_stock(ProductId(product_id)).await?;
        Ok(json!({ "product_id": product_id, "available": available }))
    }
}

pub(crate) fn required_i64(args: &Value, field: &str) -> Result<i64, AssistantError> {
    args.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| AssistantError::InvalidRequest { message: format!("`{field}` must be an integer") })
}

pub(crate) fn required_u32(args: &Value, field: &str) -> Result<u32, AssistantError> {
    let value = required_i64(args, field)?;
    u32::try_from(value)
        .map_err(|_| AssistantError::InvalidRequest { message: format!("`{field}` must be non-negative") })
}

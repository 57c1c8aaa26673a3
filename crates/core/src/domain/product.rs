use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AssistantError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

/// Inclusive suitable-age window in months.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub from_months: u32,
    pub to_months: u32,
}

impl AgeRange {
    pub fn new(from_months: u32, to_months: u32) -> Result<Self, AssistantError> {
        if from_months > to_months {
            return Err(AssistantError::InvalidRequest {
                message: format!(
                    "age range lower bound {from_months} exceeds upper bound {to_months}"
                ),
            });
        }
        Ok(Self { from_months, to_months })
    }

    pub fn contains(&self, months: u32) -> bool {
        self.from_months <= months && months <= self.to_months
    }

    /// Width of the window; smaller means a tighter age fit.
    pub fn span(&self) -> u32 {
        self.to_months - self.from_months
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand_id: BrandId,
    pub category_id: CategoryId,
    pub unit_price: Decimal,
    pub package_size_ml: u32,
    pub age_range: Option<AgeRange>,
    pub discount_pct: Decimal,
    pub stock_quantity: u32,
    pub active: bool,
}

impl Product {
    /// Unit price after discount. Discount is a percentage in `0..=100`.
    pub fn effective_price(&self) -> Decimal {
        let hundred = Decimal::from(100u32);
        self.unit_price * (hundred - self.discount_pct) / hundred
    }

    pub fn validate(&self) -> Result<(), AssistantError> {
        if self.unit_price < Decimal::ZERO {
            return Err(AssistantError::InvalidRequest {
                message: format!("product `{}` has a negative unit price", self.name),
            });
        }
        if self.discount_pct < Decimal::ZERO || self.discount_pct > Decimal::from(100u32) {
            return Err(AssistantError::InvalidRequest {
                message: format!("product `{}` discount must be within 0..=100", self.name),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    pub country_of_origin: String,
    pub premium: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// A product joined with its brand and category names, as returned by
/// catalog reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product: Product,
    pub brand_name: String,
    pub category_name: String,
}

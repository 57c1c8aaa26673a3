use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::AssistantError;

/// A validated request to purchase a quantity of one product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub email: String,
}

impl OrderRequest {
    /// Checks the request shape before any state is touched. A failing
    /// request must produce no side effect anywhere downstream.
    pub fn validate(&self) -> Result<(), AssistantError> {
        if self.quantity == 0 {
            return Err(AssistantError::InvalidRequest {
                message: "order quantity must be at least 1".to_string(),
            });
        }
        if !is_well_formed_email(&self.email) {
            return Err(AssistantError::InvalidRequest {
                message: format!("`{}` is not a valid email address", self.email),
            });
        }
        Ok(())
    }
}

/// Syntactic check only: one `@`, non-empty local part, dotted domain,
/// no whitespace. Deliverability is the mail layer's problem.
pub fn is_well_formed_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Whether the confirmation email could be handed to the dispatch queue.
/// Delivery failures after queueing are reported asynchronously and never
/// reverse the order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Queued { message_id: String },
    QueueingFailed,
}

/// Summary of a committed order, returned to the agent for composition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub brand_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub total: Decimal,
    pub email: String,
    pub dispatch: DispatchStatus,
    pub placed_at: DateTime<Utc>,
}

impl OrderReceipt {
    /// Total for `quantity` units at `unit_price` less the discount.
    pub fn compute_total(unit_price: Decimal, discount_pct: Decimal, quantity: u32) -> Decimal {
        let hundred = Decimal::from(100u32);
        unit_price * Decimal::from(quantity) * (hundred - discount_pct) / hundred
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::{is_well_formed_email, OrderReceipt, OrderRequest};
    use crate::domain::product::ProductId;
    use crate::errors::AssistantError;

    #[test]
    fn zero_quantity_is_invalid() {
        let request = OrderRequest {
            product_id: ProductId(1),
            quantity: 0,
            email: "buyer@example.com".to_string(),
        };
        assert!(matches!(request.validate(), Err(AssistantError::InvalidRequest { .. })));
    }

    #[test]
    fn malformed_email_is_invalid() {
        for bad in ["", "no-at-sign", "@example.com", "a@", "a@nodot", "two words@example.com"] {
            let request = OrderRequest {
                product_id: ProductId(1),
                quantity: 1,
                email: bad.to_string(),
            };
            assert!(request.validate().is_err(), "expected rejection for `{bad}`");
        }
    }

    #[test]
    fn well_formed_request_passes() {
        let request = OrderRequest {
            product_id: ProductId(7),
            quantity: 3,
            email: "parent@mail.example.org".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn email_shape_checks() {
        assert!(is_well_formed_email("a@b.co"));
        assert!(is_well_formed_email("first.last+tag@sub.domain.com"));
        assert!(!is_well_formed_email("a@@b.co"));
        assert!(!is_well_formed_email("a@.co"));
    }

    #[test]
    fn total_applies_quantity_and_discount() {
        assert_eq!(OrderReceipt::compute_total(dec!(150.00), dec!(10), 2), dec!(270.00));
        assert_eq!(OrderReceipt::compute_total(dec!(99.00), dec!(0), 1), dec!(99.00));
    }
}

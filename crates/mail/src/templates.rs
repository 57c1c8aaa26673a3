use cartly_core::domain::order::OrderReceipt;
use tera::{Context, Tera};
use thiserror::Error;

use crate::transport::EmailMessage;

const CONFIRMATION_TEMPLATE: &str = "confirmation.html.tera";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
}

/// Renders order receipts into confirmation messages. Templates are
/// embedded so rendering works the same in tests and in production.
pub struct ConfirmationRenderer {
    tera: Tera,
    from_address: String,
}

impl ConfirmationRenderer {
    pub fn new(from_address: String) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            CONFIRMATION_TEMPLATE,
            include_str!("../../../templates/email/confirmation.html.tera"),
        )
        .map_err(|error| RenderError::Template(error.to_string()))?;
        Ok(Self { tera, from_address })
    }

    pub fn render(&self, receipt: &OrderReceipt) -> Result<EmailMessage, RenderError> {
        let mut context = Context::new();
        context.insert("order_id", &receipt.order_id);
        context.insert("product_name", &receipt.product_name);
        context.insert("brand_name", &receipt.brand_name);
        context.insert("quantity", &receipt.quantity);
        context.insert("unit_price", &receipt.unit_price.to_string());
        context.insert("discount_pct", &receipt.discount_pct.normalize().to_string());
        context.insert("total", &receipt.total.to_string());
        context.insert("placed_at", &receipt.placed_at.format("%Y-%m-%d %H:%M UTC").to_string());

        let body_html = self
            .tera
            .render(CONFIRMATION_TEMPLATE, &context)
            .map_err(|error| RenderError::Template(error.to_string()))?;

        Ok(EmailMessage {
            to: receipt.email.clone(),
            from: self.from_address.clone(),
            subject: format!("Order {} confirmed", receipt.order_id),
            body_html,
        })
    }
}

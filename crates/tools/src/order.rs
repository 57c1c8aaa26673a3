use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use cartly_core::domain::order::{DispatchStatus, OrderReceipt, OrderRequest};
use cartly_core::errors::AssistantError;
use cartly_core::ProductId;
use cartly_db::repositories::{CatalogRepository, StockReservation};
use cartly_mail::{ConfirmationRenderer, Mailer};

use crate::registry::Tool;
use crate::schema::{ArgKind, ArgSpec, ToolSchema};
use crate::search::{required_i64, required_u32};

/// The single write path into the catalog. Stock is decremented by an
/// atomic conditional update; the confirmation email is queued after the
/// decrement commits and a queueing failure never reverses the order.
pub struct OrderService<R: CatalogRepository> {
    repository: Arc<R>,
    mailer: Arc<Mailer>,
    renderer: Arc<ConfirmationRenderer>,
}

impl<R: CatalogRepository> OrderService<R> {
    pub fn new(repository: Arc<R>, mailer: Arc<Mailer>, renderer: Arc<ConfirmationRenderer>) -> Self {
        Self { repository, mailer, renderer }
    }

    pub async fn place_order(&self, request: OrderRequest) -> Result<OrderReceipt, AssistantError> {
        // Everything before the reservation is side-effect free: a
        // rejected request leaves stock untouched.
        request.validate()?;

        let entry = self
            .repository
            .get_product(request.product_id)
            .await
            .map_err(|error| AssistantError::internal(error.to_string()))?
            .ok_or_else(|| {
                AssistantError::not_found(format!("product {}", request.product_id.0))
            })?;

        let reservation = self
            .repository
            .reserve_stock(request.product_id, request.quantity)
            .await
            .map_err(|error| AssistantError::internal(error.to_string()))?;

        match reservation {
            StockReservation::Reserved => {}
            StockReservation::InsufficientStock { available } => {
                return Err(AssistantError::InsufficientStock {
                    available,
                    requested: request.quantity,
                });
            }
            StockReservation::NotFound => {
                return Err(AssistantError::not_found(format!(
                    "product {}",
                    request.product_id.0
                )));
            }
        }

        let product = entry.product;
        let total =
            OrderReceipt::compute_total(product.unit_price, product.discount_pct, request.quantity);
        let order_id = Uuid::new_v4().to_string();

        let mut receipt = OrderReceipt {
            order_id,
            product_id: product.id,
            product_name: product.name,
            brand_name: entry.brand_name,
            quantity: request.quantity,
            unit_price: product.unit_price,
            discount_pct: product.discount_pct,
            total,
            email: request.email,
            dispatch: DispatchStatus::QueueingFailed,
            placed_at: cartly_core::chrono::Utc::now(),
        };

        // Stock is already committed; from here on failure only degrades
        // the dispatch status on the receipt.
        receipt.dispatch = match self.renderer.render(&receipt) {
            Ok(message) => match self.mailer.enqueue(message) {
                Ok(message_id) => DispatchStatus::Queued { message_id: message_id.to_string() },
                Err(error) => {
                    warn!(order_id = %receipt.order_id, error = %error, "confirmation could not be queued");
                    DispatchStatus::QueueingFailed
                }
            },
            Err(error) => {
                warn!(order_id = %receipt.order_id, error = %error, "confirmation could not be rendered");
                DispatchStatus::QueueingFailed
            }
        };

        info!(
            order_id = %receipt.order_id,
            product_id = receipt.product_id.0,
            quantity = receipt.quantity,
            total = %receipt.total,
            "order placed"
        );
        Ok(receipt)
    }
}

/// `place_order`: reserve stock and queue a confirmation email.
pub struct PlaceOrderTool<R: CatalogRepository> {
    service: Arc<OrderService<R>>,
}

impl<R: CatalogRepository> PlaceOrderTool<R> {
    pub fn new(service: Arc<OrderService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: CatalogRepository + 'static> Tool for PlaceOrderTool<R> {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "place_order",
            "Order a quantity of a product and email a confirmation",
            vec![
                ArgSpec::required("product_id", ArgKind::Integer),
                ArgSpec::required("quantity", ArgKind::Integer),
                ArgSpec::required("email", ArgKind::String),
            ],
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, AssistantError> {
        let request = OrderRequest {
            product_id: ProductId(required_i64(&args, "product_id")?),
            quantity: required_u32(&args, "quantity")?,
            email: args
                .get("email")
                .and_then(Value::as_str)
                .ok_or_else(|| AssistantError::InvalidRequest {
                    message: "`email` must be a string".to_string(),
                })?
                .to_string(),
        };
        let receipt = self.service.place_order(request).await?;
        serde_json::to_value(&receipt)
            .map_err(|error| AssistantError::internal(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartly_core::domain::product::{Brand, BrandId, Category, CategoryId, Product};
    use cartly_db::repositories::InMemoryCatalogRepository;
    use cartly_mail::{EmailTransport, RecordingTransport, RetryPolicy};
    use rust_decimal_macros::dec;

    struct Harness {
        repo: Arc<InMemoryCatalogRepository>,
        transport: Arc<RecordingTransport>,
        service: Arc<OrderService<InMemoryCatalogRepository>>,
    }

    async fn harness(queue_capacity: usize) -> Harness {
        let repo = Arc::new(InMemoryCatalogRepository::default());
        repo.save_brand(Brand {
            id: BrandId(1),
            name: "Nordmilch".into(),
            country_of_origin: "Germany".into(),
            premium: false,
        })
        .await
        .unwrap();
        repo.save_category(Category { id: CategoryId(1), name: "Infant formula".into() })
            .await
            .unwrap();
        repo.save_product(Product {
            id: ProductId(1),
            name: "Stage One".into(),
            brand_id: BrandId(1),
            category_id: CategoryId(1),
            unit_price: dec!(12.00),
            package_size_ml: 800,
            age_range: None,
            discount_pct: dec!(25),
            stock_quantity: 3,
            active: true,
        })
        .await
        .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let policy = RetryPolicy { max_retries: 1, base_delay_ms: 1, max_delay_ms: 2 };
        let mailer = Arc::new(Mailer::spawn(
            Arc::clone(&transport) as Arc<dyn EmailTransport>,
            policy,
            queue_capacity,
        ));
        let renderer =
            Arc::new(ConfirmationRenderer::new("orders@cartly.test".to_string()).unwrap());
        let service = Arc::new(OrderService::new(Arc::clone(&repo), mailer, renderer));
        Harness { repo, transport, service }
    }

    fn request(quantity: u32) -> OrderRequest {
        OrderRequest {
            product_id: ProductId(1),
            quantity,
            email: "parent@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_order_decrements_stock_and_queues_mail() {
        let h = harness(8).await;
        let receipt = h.service.place_order(request(2)).await.unwrap();

        assert_eq!(receipt.quantity, 2);
        assert_eq!(receipt.total, dec!(18.00));
        assert!(matches!(receipt.dispatch, DispatchStatus::Queued { .. }));
        assert_eq!(h.repo.check_stock(ProductId(1)).await.unwrap(), Some(1));

        for _ in 0..200 {
            if !h.transport.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "parent@example.com");
        assert!(sent[0].body_html.contains("Stage One"));
    }

    #[tokio::test]
    async fn insufficient_stock_reports_available_and_leaves_stock_alone() {
        let h = harness(8).await;
        let error = h.service.place_order(request(5)).await.unwrap_err();
        assert_eq!(error, AssistantError::InsufficientStock { available: 3, requested: 5 });
        assert_eq!(h.repo.check_stock(ProductId(1)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn invalid_email_fails_before_any_reservation() {
        let h = harness(8).await;
        let mut bad = request(1);
        bad.email = "not an address".to_string();
        let error = h.service.place_order(bad).await.unwrap_err();
        assert!(matches!(error, AssistantError::InvalidRequest { .. }));
        assert_eq!(h.repo.check_stock(ProductId(1)).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let h = harness(8).await;
        let mut bad = request(1);
        bad.product_id = ProductId(42);
        let error = h.service.place_order(bad).await.unwrap_err();
        assert!(matches!(error, AssistantError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delivery_failure_after_queueing_never_reverses_the_order() {
        let repo = harness(8).await.repo;
        let transport = Arc::new(RecordingTransport::failing_first(100));
        let mailer = Arc::new(Mailer::spawn(
            Arc::clone(&transport) as Arc<dyn EmailTransport>,
            RetryPolicy { max_retries: 1, base_delay_ms: 1, max_delay_ms: 2 },
            8,
        ));
        let ledger = mailer.ledger();
        let renderer =
            Arc::new(ConfirmationRenderer::new("orders@cartly.test".to_string()).unwrap());
        let service = Arc::new(OrderService::new(Arc::clone(&repo), mailer, renderer));

        let receipt = service.place_order(request(1)).await.unwrap();

        // Queueing succeeded even though delivery is doomed.
        assert!(matches!(receipt.dispatch, DispatchStatus::Queued { .. }));
        assert_eq!(repo.check_stock(ProductId(1)).await.unwrap(), Some(2));

        for _ in 0..200 {
            if !ledger.outcomes().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let outcomes = ledger.outcomes().await;
        assert!(
            matches!(outcomes.as_slice(), [cartly_mail::DeliveryOutcome::Failed { .. }]),
            "expected a recorded failure, got {outcomes:?}"
        );
        // Stock still reflects the committed order.
        assert_eq!(repo.check_stock(ProductId(1)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn queueing_failure_keeps_the_order_committed() {
        let h = harness(8).await;
        let h2 = HarnessWithClosedQueue::build(h.repo.clone()).await;

        let receipt = h2.service.place_order(request(1)).await.unwrap();
        assert_eq!(receipt.dispatch, DispatchStatus::QueueingFailed);
        assert_eq!(h2.repo.check_stock(ProductId(1)).await.unwrap(), Some(2));
    }

    struct HarnessWithClosedQueue {
        repo: Arc<InMemoryCatalogRepository>,
        service: Arc<OrderService<InMemoryCatalogRepository>>,
    }

    impl HarnessWithClosedQueue {
        async fn build(repo: Arc<InMemoryCatalogRepository>) -> Self {
            struct StallingTransport;

            #[async_trait]
            impl EmailTransport for StallingTransport {
                async fn send(
                    &self,
                    _message: &cartly_mail::EmailMessage,
                ) -> Result<(), cartly_mail::TransportError> {
                    std::future::pending().await
                }
            }

            // Capacity one with a stalled worker: first enqueue occupies
            // the worker, second fills the slot, later orders cannot queue.
            let mailer = Arc::new(Mailer::spawn(
                Arc::new(StallingTransport),
                RetryPolicy { max_retries: 0, base_delay_ms: 1, max_delay_ms: 1 },
                1,
            ));
            let renderer =
                Arc::new(ConfirmationRenderer::new("orders@cartly.test".to_string()).unwrap());
            for _ in 0..2 {
                let _ = mailer.enqueue(cartly_mail::EmailMessage {
                    to: "fill@example.com".into(),
                    from: "orders@cartly.test".into(),
                    subject: "fill".into(),
                    body_html: String::new(),
                });
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            let service =
                Arc::new(OrderService::new(Arc::clone(&repo), mailer, renderer));
            Self { repo, service }
        }
    }
}

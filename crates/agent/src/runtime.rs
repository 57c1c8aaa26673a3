use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use cartly_core::domain::conversation::{ConversationTurn, SessionId};
use cartly_core::errors::AssistantError;
use cartly_tools::ToolRegistry;

use crate::conversation::{Intent, IntentExtractor, ProductQuery};
use crate::memory::ConversationMemory;

/// Per-turn phases. Each turn runs the full sequence once; there is no
/// cross-turn state outside conversation memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TurnPhase {
    Classifying,
    Dispatching,
    Composing,
}

#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    pub dispatch_timeout: Duration,
    pub search_limit: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { dispatch_timeout: Duration::from_secs(10), search_limit: 15 }
    }
}

/// Routes one user utterance through classify → dispatch → compose and
/// keeps the session transcript. Tool calls are bounded by the dispatch
/// timeout; a timed-out call leaves no trace beyond a transcript entry.
pub struct AgentRuntime {
    registry: Arc<ToolRegistry>,
    memory: ConversationMemory,
    extractor: IntentExtractor,
    options: RuntimeOptions,
}

impl AgentRuntime {
    pub fn new(registry: Arc<ToolRegistry>, memory: ConversationMemory, options: RuntimeOptions) -> Self {
        Self { registry, memory, extractor: IntentExtractor::new(), options }
    }

    pub async fn handle_message(
        &self,
        session: &SessionId,
        text: &str,
    ) -> Result<String, AssistantError> {
        let history = self.memory.history(session).await?;
        self.memory.append(session, ConversationTurn::user(text)).await?;

        let intent = self.extractor.extract(text, &history);
        debug!(session = %session.0, phase = ?TurnPhase::Classifying, ?intent, "utterance classified");

        let reply = match intent {
            // Clarifications never reach a tool.
            Intent::Clarify { prompt } => prompt,
            other => self.dispatch_intent(session, other).await,
        };

        self.memory.append(session, ConversationTurn::assistant(reply.clone())).await?;
        Ok(reply)
    }

    async fn dispatch_intent(&self, session: &SessionId, intent: Intent) -> String {
        debug!(session = %session.0, phase = ?TurnPhase::Dispatching, "dispatching intent");
        let outcome = match intent {
            Intent::Search(mut filter) => {
                if filter.limit.is_none() {
                    filter.limit = Some(self.options.search_limit);
                }
                let args = match serde_json::to_value(&filter) {
                    Ok(args) => args,
                    Err(error) => return render_error(&AssistantError::internal(error.to_string())),
                };
                self.call_tool(session, "catalog_search", args).await.map(render_hits)
            }
            Intent::RecommendAge { months } => self
                .call_tool(session, "recommend_by_age", json!({ "age_months": months }))
                .await
                .map(render_hits),
            Intent::CheckStock { product } => match self.resolve_product(session, &product).await {
                Ok(product_id) => self
                    .call_tool(session, "check_stock", json!({ "product_id": product_id }))
                    .await
                    .map(render_stock),
                Err(error) => Err(error),
            },
            Intent::PlaceOrder { product, quantity, email } => {
                self.place_order(session, &product, quantity, &email).await
            }
            Intent::CheckThenOrder { product, quantity, email } => {
                self.check_then_order(session, &product, quantity, &email).await
            }
            Intent::Clarify { prompt } => Ok(prompt),
        };

        debug!(session = %session.0, phase = ?TurnPhase::Composing, "composing reply");
        match outcome {
            Ok(reply) => reply,
            Err(error) => render_error(&error),
        }
    }

    async fn place_order(
        &self,
        session: &SessionId,
        product: &ProductQuery,
        quantity: u32,
        email: &str,
    ) -> Result<String, AssistantError> {
        let product_id = self.resolve_product(session, product).await?;
        let receipt = self
            .call_tool(
                session,
                "place_order",
                json!({ "product_id": product_id, "quantity": quantity, "email": email }),
            )
            .await?;
        Ok(render_receipt(receipt))
    }

    /// Compound utterance: the availability check runs first and an
    /// insufficient result suppresses the order entirely.
    async fn check_then_order(
        &self,
        session: &SessionId,
        product: &ProductQuery,
        quantity: u32,
        email: &str,
    ) -> Result<String, AssistantError> {
        let product_id = self.resolve_product(session, product).await?;
        let stock = self
            .call_tool(session, "check_stock", json!({ "product_id": product_id }))
            .await?;
        let available = stock["available"].as_u64().unwrap_or(0) as u32;

        if available < quantity {
            return Err(AssistantError::InsufficientStock { available, requested: quantity });
        }

        let receipt = self
            .call_tool(
                session,
                "place_order",
                json!({ "product_id": product_id, "quantity": quantity, "email": email }),
            )
            .await?;
        Ok(render_receipt(receipt))
    }

    /// Name references are resolved through the search capability; ids
    /// pass straight through.
    async fn resolve_product(
        &self,
        session: &SessionId,
        product: &ProductQuery,
    ) -> Result<i64, AssistantError> {
        match product {
            ProductQuery::ById(id) => Ok(*id),
            ProductQuery::ByName(name) => {
                let hits = self
                    .call_tool(session, "catalog_search", json!({ "name": name, "limit": 1 }))
                    .await?;
                hits["hits"]
                    .as_array()
                    .and_then(|array| array.first())
                    .and_then(|hit| hit["product_id"].as_i64())
                    .ok_or_else(|| AssistantError::not_found(format!("a product matching \"{name}\"")))
            }
        }
    }

    async fn call_tool(
        &self,
        session: &SessionId,
        name: &str,
        args: Value,
    ) -> Result<Value, AssistantError> {
        let result = timeout(self.options.dispatch_timeout, self.registry.dispatch(name, args))
            .await
            .map_err(|_| {
                warn!(session = %session.0, tool = name, "tool call timed out");
                AssistantError::Timeout { what: format!("the {name} call") }
            })?;

        // Transcript entry for the tool interaction, success or not.
        let note = match &result {
            Ok(value) => format!("{name} {}", summarize(value)),
            Err(error) => format!("{name} failed: {}", error.reason_code()),
        };
        if let Err(error) = self.memory.append(session, ConversationTurn::tool(note)).await {
            warn!(session = %session.0, error = %error, "could not record tool turn");
        }
        result
    }
}

/// Compact transcript form so pronoun resolution can find product ids
/// in later turns without replaying full tool payloads.
fn summarize(value: &Value) -> String {
    if let Some(hits) = value["hits"].as_array() {
        let ids: Vec<String> = hits
            .iter()
            .filter_map(|hit| hit["product_id"].as_i64())
            .map(|id| format!("product_id {id}"))
            .collect();
        return format!("hits {} [{}]", hits.len(), ids.join(", "));
    }
    if let (Some(id), Some(available)) = (value["product_id"].as_i64(), value["available"].as_u64())
    {
        return format!("product_id {id} available {available}");
    }
    if let Some(order_id) = value["order_id"].as_str() {
        let id = value["product_id"].as_i64().unwrap_or_default();
        return format!("order {order_id} product_id {id}");
    }
    value.to_string()
}

fn render_hits(value: Value) -> String {
    let Some(hits) = value["hits"].as_array() else {
        return "I couldn't read the search results.".to_string();
    };
    if hits.is_empty() {
        return "I couldn't find anything matching that.".to_string();
    }

    let mut lines = vec![format!("I found {}:", plural(hits.len(), "product"))];
    for hit in hits {
        let name = hit["name"].as_str().unwrap_or("unknown");
        let brand = hit["brand"].as_str().unwrap_or("unknown");
        let id = hit["product_id"].as_i64().unwrap_or_default();
        let price = hit["effective_price"].as_str().map(str::to_string).unwrap_or_else(|| {
            hit["effective_price"].to_string()
        });
        let stock = hit["stock_quantity"].as_u64().unwrap_or(0);
        let availability =
            if stock > 0 { format!("{stock} in stock") } else { "out of stock".to_string() };
        lines.push(format!("  {id}. {name} by {brand} at {price} ({availability})"));
    }
    lines.join("\n")
}

fn render_stock(value: Value) -> String {
    let id = value["product_id"].as_i64().unwrap_or_default();
    let available = value["available"].as_u64().unwrap_or(0);
    if available == 0 {
        format!("Product {id} is currently out of stock.")
    } else {
        format!("Product {id} has {} available.", plural(available as usize, "unit"))
    }
}

fn render_receipt(value: Value) -> String {
    let name = value["product_name"].as_str().unwrap_or("the product");
    let quantity = value["quantity"].as_u64().unwrap_or(0);
    let total = value["total"].as_str().map(str::to_string).unwrap_or_else(|| value["total"].to_string());
    let email = value["email"].as_str().unwrap_or("your address");
    let order_id = value["order_id"].as_str().unwrap_or("unknown");

    let queued = value["dispatch"].get("queued").is_some();
    let mail_note = if queued {
        format!("A confirmation email is on its way to {email}.")
    } else {
        "The order is confirmed, but I couldn't queue the confirmation email.".to_string()
    };
    format!("Order {order_id} placed: {quantity} x {name} for {total}. {mail_note}")
}

/// Recoverable failures render their specific constraint; internal
/// failures get an apology without detail.
fn render_error(error: &AssistantError) -> String {
    match error {
        AssistantError::InvalidRequest { message } => {
            format!("I can't do that as asked: {message}.")
        }
        AssistantError::NotFound { what } => format!("Sorry, {what} was not found."),
        AssistantError::InsufficientStock { available, requested } => format!(
            "Only {available} in stock, but you asked for {requested}. Want the {available} that are left?"
        ),
        AssistantError::Timeout { what } => {
            format!("Sorry, {what} took too long. Please try again.")
        }
        AssistantError::QueueingFailed { message } => {
            format!("The order went through, but the confirmation email did not: {message}.")
        }
        AssistantError::Internal { .. } => {
            "Something went wrong on my side. Please try again in a moment.".to_string()
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartly_core::domain::product::{Brand, BrandId, Category, CategoryId, Product, ProductId};
    use cartly_db::repositories::{
        CatalogRepository, InMemoryCatalogRepository, InMemorySessionRepository,
    };
    use cartly_mail::{ConfirmationRenderer, EmailTransport, Mailer, RecordingTransport, RetryPolicy};
    use cartly_tools::{
        CatalogSearchTool, CheckStockTool, OrderService, PlaceOrderTool, RecommendByAgeTool,
        SearchService,
    };
    use rust_decimal_macros::dec;

    struct World {
        repo: Arc<InMemoryCatalogRepository>,
        runtime: AgentRuntime,
    }

    async fn world() -> World {
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
            id: ProductId(3),
            name: "Stage One".into(),
            brand_id: BrandId(1),
            category_id: CategoryId(1),
            unit_price: dec!(12.00),
            package_size_ml: 800,
            age_range: None,
            discount_pct: dec!(0),
            stock_quantity: 4,
            active: true,
        })
        .await
        .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let mailer = Arc::new(Mailer::spawn(
            transport as Arc<dyn EmailTransport>,
            RetryPolicy { max_retries: 0, base_delay_ms: 1, max_delay_ms: 1 },
            8,
        ));
        let renderer =
            Arc::new(ConfirmationRenderer::new("orders@cartly.test".to_string()).unwrap());

        let search = Arc::new(SearchService::new(Arc::clone(&repo)));
        let orders = Arc::new(OrderService::new(Arc::clone(&repo), mailer, renderer));

        let mut registry = ToolRegistry::default();
        registry.register(CatalogSearchTool::new(Arc::clone(&search)));
        registry.register(RecommendByAgeTool::new(Arc::clone(&search)));
        registry.register(CheckStockTool::new(search));
        registry.register(PlaceOrderTool::new(orders));

        let memory =
            ConversationMemory::new(Arc::new(InMemorySessionRepository::default()), 20);
        let runtime =
            AgentRuntime::new(Arc::new(registry), memory, RuntimeOptions::default());
        World { repo, runtime }
    }

    fn session() -> SessionId {
        SessionId("test-session".to_string())
    }

    #[tokio::test]
    async fn missing_email_gets_clarification_without_dispatch() {
        let w = world().await;
        let reply = w.runtime.handle_message(&session(), "buy 2 of product 3").await.unwrap();

        assert!(reply.contains("email"), "reply was: {reply}");
        // No reservation happened.
        assert_eq!(w.repo.check_stock(ProductId(3)).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn order_flow_reserves_and_confirms() {
        let w = world().await;
        let reply = w
            .runtime
            .handle_message(&session(), "buy 2 of product 3, parent@example.com")
            .await
            .unwrap();

        assert!(reply.contains("Order"), "reply was: {reply}");
        assert!(reply.contains("confirmation email"), "reply was: {reply}");
        assert_eq!(w.repo.check_stock(ProductId(3)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn check_then_order_short_circuits_on_insufficient_stock() {
        let w = world().await;
        let reply = w
            .runtime
            .handle_message(
                &session(),
                "check stock and buy 9 of product 3, parent@example.com",
            )
            .await
            .unwrap();

        assert!(reply.contains("Only 4"), "reply was: {reply}");
        // The order leg never ran.
        assert_eq!(w.repo.check_stock(ProductId(3)).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn unknown_product_renders_not_found() {
        let w = world().await;
        let reply = w
            .runtime
            .handle_message(&session(), "is product 77 in stock?")
            .await
            .unwrap();
        assert!(reply.contains("not found"), "reply was: {reply}");
    }

    #[tokio::test]
    async fn pronoun_order_uses_earlier_stock_check() {
        let w = world().await;
        let s = session();
        let first = w.runtime.handle_message(&s, "is product 3 in stock?").await.unwrap();
        assert!(first.contains("4"), "reply was: {first}");

        let second = w
            .runtime
            .handle_message(&s, "buy 2 of it, parent@example.com")
            .await
            .unwrap();
        assert!(second.contains("Stage One"), "reply was: {second}");
        assert_eq!(w.repo.check_stock(ProductId(3)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn transcript_keeps_user_tool_and_assistant_turns_in_order() {
        let w = world().await;
        let s = session();
        w.runtime.handle_message(&s, "is product 3 in stock?").await.unwrap();

        let history = w.runtime.memory.history(&s).await.unwrap();
        let roles: Vec<_> = history.iter().map(|turn| turn.role).collect();
        use cartly_core::domain::conversation::TurnRole;
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Tool, TurnRole::Assistant]);
    }

    #[tokio::test]
    async fn search_by_name_resolves_for_stock_check() {
        let w = world().await;
        let reply = w
            .runtime
            .handle_message(&session(), "is \"stage one\" available?")
            .await
            .unwrap();
        assert!(reply.contains("4"), "reply was: {reply}");
    }
}

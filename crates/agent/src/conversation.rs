use cartly_core::domain::conversation::{ConversationTurn, TurnRole};
use cartly_core::query::{SearchFilter, SortMode};

/// How the user referred to a product. Numeric ids dispatch directly;
/// names are resolved against the catalog before the capability call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductQuery {
    ById(i64),
    ByName(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Search(SearchFilter),
    RecommendAge { months: u32 },
    CheckStock { product: ProductQuery },
    PlaceOrder { product: ProductQuery, quantity: u32, email: String },
    /// Availability check followed by an order, from one utterance.
    /// The order only runs if the check covers the quantity.
    CheckThenOrder { product: ProductQuery, quantity: u32, email: String },
    Clarify { prompt: String },
}

/// Deterministic keyword/pattern classifier. Recent history fills in a
/// product reference when the user says "it" or "that one".
#[derive(Clone, Debug, Default)]
pub struct IntentExtractor;

impl IntentExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str, history: &[ConversationTurn]) -> Intent {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);

        let wants_order = mentions_order(&normalized);
        let wants_stock = mentions_stock(&normalized);
        let age_months = extract_age_months(&tokens);
        let email = extract_email(text);
        let product = extract_product(&normalized, &tokens)
            .or_else(|| referenced_product_from_history(&normalized, history));

        if wants_order {
            return self.order_intent(product, &tokens, email, wants_stock);
        }

        if wants_stock {
            return match product {
                Some(product) => Intent::CheckStock { product },
                None => Intent::Clarify {
                    prompt: "Which product should I check stock for?".to_string(),
                },
            };
        }

        if let Some(months) = age_months {
            return Intent::RecommendAge { months };
        }

        if let Some(filter) = search_filter(&normalized, &tokens, product) {
            return Intent::Search(filter);
        }

        Intent::Clarify {
            prompt: "I can search the catalog, recommend products by age, check stock, or place an order. What would you like?"
                .to_string(),
        }
    }

    fn order_intent(
        &self,
        product: Option<ProductQuery>,
        tokens: &[String],
        email: Option<String>,
        compound: bool,
    ) -> Intent {
        let quantity = extract_quantity(tokens);

        let mut missing = Vec::new();
        if product.is_none() {
            missing.push("which product");
        }
        if quantity.is_none() {
            missing.push("how many");
        }
        if email.is_none() {
            missing.push("an email address for the confirmation");
        }
        if !missing.is_empty() {
            return Intent::Clarify {
                prompt: format!("To place the order I still need: {}.", missing.join(", ")),
            };
        }

        // All three checked above.
        let (Some(product), Some(quantity), Some(email)) = (product, quantity, email) else {
            return Intent::Clarify { prompt: "To place the order I need the product, quantity, and an email address.".to_string() };
        };

        if compound {
            Intent::CheckThenOrder { product, quantity, email }
        } else {
            Intent::PlaceOrder { product, quantity, email }
        }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '@' | '.' | '#' | '-' | '_') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn mentions_order(normalized: &str) -> bool {
    ["buy", "order", "purchase", "take "].iter().any(|keyword| normalized.contains(keyword))
}

fn mentions_stock(normalized: &str) -> bool {
    ["in stock", "stock", "available", "availability", "how many", "left"]
        .iter()
        .any(|keyword| normalized.contains(keyword))
}

fn extract_age_months(tokens: &[String]) -> Option<u32> {
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if matches!(unit.as_str(), "month" | "months" | "month-old" | "months-old") {
                if let Ok(months) = value.parse::<u32>() {
                    return Some(months);
                }
            }
            if matches!(unit.as_str(), "year" | "years" | "year-old" | "years-old") {
                if let Ok(years) = value.parse::<u32>() {
                    return Some(years.saturating_mul(12));
                }
            }
        }
    }
    None
}

fn extract_email(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| matches!(c, ',' | ';' | ')' | '(' | '<' | '>')))
        .find(|word| {
            let Some((local, domain)) = word.split_once('@') else { return false };
            !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
        })
        .map(|word| word.to_string())
}

fn extract_product(normalized: &str, tokens: &[String]) -> Option<ProductQuery> {
    // "#3", "product 3", "id 3"
    for token in tokens {
        if let Some(raw) = token.strip_prefix('#') {
            if let Ok(id) = raw.parse::<i64>() {
                return Some(ProductQuery::ById(id));
            }
        }
    }
    for window in tokens.windows(2) {
        if let [keyword, value] = window {
            if matches!(keyword.as_str(), "product" | "id" | "item") {
                if let Ok(id) = value.parse::<i64>() {
                    return Some(ProductQuery::ById(id));
                }
            }
        }
    }

    // Quoted name: buy 2 "Stage One Value"
    if let Some(start) = normalized.find('"') {
        if let Some(length) = normalized[start + 1..].find('"') {
            let name = normalized[start + 1..start + 1 + length].trim();
            if !name.is_empty() {
                return Some(ProductQuery::ByName(name.to_string()));
            }
        }
    }

    // "... of <name>" with trailing clause cut at common boundaries.
    for marker in [" of ", " some "] {
        if let Some(position) = normalized.find(marker) {
            let tail = &normalized[position + marker.len()..];
            let name = trim_trailing_clause(tail);
            if !name.is_empty() && !is_reference_pronoun(name) {
                return Some(ProductQuery::ByName(name.to_string()));
            }
        }
    }
    None
}

fn trim_trailing_clause(tail: &str) -> &str {
    let mut end = tail.len();
    for boundary in [" for ", " to ", " and ", ",", "?", "."] {
        if let Some(position) = tail.find(boundary) {
            end = end.min(position);
        }
    }
    tail[..end].trim()
}

fn is_reference_pronoun(name: &str) -> bool {
    matches!(name, "it" | "that" | "that one" | "them" | "those" | "this")
}

/// Scan history newest-first for a product the conversation already
/// settled on, but only when the current utterance points backwards.
fn referenced_product_from_history(
    normalized: &str,
    history: &[ConversationTurn],
) -> Option<ProductQuery> {
    let refers_back = [" it", "that one", "those", " them", "the same"]
        .iter()
        .any(|pronoun| normalized.contains(pronoun));
    if !refers_back {
        return None;
    }

    for turn in history.iter().rev() {
        if turn.role == TurnRole::User {
            continue;
        }
        let turn_tokens = tokenize(&normalize_text(&turn.content));
        for window in turn_tokens.windows(2) {
            if let [keyword, value] = window {
                if keyword == "product_id" || keyword == "product" {
                    if let Ok(id) = value.parse::<i64>() {
                        return Some(ProductQuery::ById(id));
                    }
                }
            }
        }
    }
    None
}

fn extract_quantity(tokens: &[String]) -> Option<u32> {
    // "2 of", "2 packs", "2 units", "x2", or a bare leading number after
    // the order verb.
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if matches!(
                unit.as_str(),
                "of" | "pack" | "packs" | "unit" | "units" | "bottle" | "bottles" | "box" | "boxes"
            ) {
                if let Ok(quantity) = value.parse::<u32>() {
                    return Some(quantity);
                }
            }
        }
    }
    for token in tokens {
        if let Some(raw) = token.strip_prefix('x') {
            if let Ok(quantity) = raw.parse::<u32>() {
                return Some(quantity);
            }
        }
    }
    for window in tokens.windows(2) {
        if let [verb, value] = window {
            if matches!(verb.as_str(), "buy" | "order" | "purchase" | "take") {
                if let Ok(quantity) = value.parse::<u32>() {
                    return Some(quantity);
                }
            }
        }
    }
    None
}

fn search_filter(
    normalized: &str,
    tokens: &[String],
    product: Option<ProductQuery>,
) -> Option<SearchFilter> {
    let mut filter = SearchFilter::default();
    let mut constrained = false;

    if let Some(ProductQuery::ByName(name)) = &product {
        filter.name = Some(name.clone());
        constrained = true;
    }

    if let Some(max) = extract_price_bound(tokens, &["under", "below", "max", "cheaper"]) {
        filter.max_price = Some(max);
        constrained = true;
    }
    if let Some(min) = extract_price_bound(tokens, &["over", "above", "min"]) {
        filter.min_price = Some(min);
        constrained = true;
    }
    if normalized.contains("discount") || normalized.contains("sale") || normalized.contains("deal")
    {
        filter.discount_only = true;
        filter.sort = SortMode::DiscountFirst;
        constrained = true;
    }

    let searching = ["search", "find", "show", "looking for", "what do you have", "which"]
        .iter()
        .any(|keyword| normalized.contains(keyword));

    if searching && !constrained {
        // Free-text search: everything after the search verb.
        for marker in ["looking for ", "search for ", "find ", "show me ", "show "] {
            if let Some(position) = normalized.find(marker) {
                let name = trim_trailing_clause(&normalized[position + marker.len()..]);
                if !name.is_empty() {
                    filter.name = Some(name.to_string());
                    constrained = true;
                    break;
                }
            }
        }
    }

    if constrained || searching {
        Some(filter)
    } else {
        None
    }
}

fn extract_price_bound(tokens: &[String], markers: &[&str]) -> Option<f64> {
    for window in tokens.windows(2) {
        if let [marker, value] = window {
            if markers.contains(&marker.as_str()) {
                let raw = value.trim_start_matches('$').trim_end_matches("eur");
                if let Ok(price) = raw.parse::<f64>() {
                    return Some(price);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Intent {
        IntentExtractor::new().extract(text, &[])
    }

    #[test]
    fn full_order_in_one_utterance() {
        let intent = extract("buy 2 of product 3 for me, parent@example.com");
        assert_eq!(
            intent,
            Intent::PlaceOrder {
                product: ProductQuery::ById(3),
                quantity: 2,
                email: "parent@example.com".to_string(),
            }
        );
    }

    #[test]
    fn order_without_email_asks_for_it() {
        let intent = extract("order 2 of product 3");
        match intent {
            Intent::Clarify { prompt } => assert!(prompt.contains("email")),
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn order_without_quantity_or_email_lists_both() {
        let intent = extract("i want to buy product 3");
        match intent {
            Intent::Clarify { prompt } => {
                assert!(prompt.contains("how many"));
                assert!(prompt.contains("email"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn stock_question_with_product_name() {
        let intent = extract("how much of \"stage one\" is in stock?");
        assert_eq!(
            intent,
            Intent::CheckStock { product: ProductQuery::ByName("stage one".to_string()) }
        );
    }

    #[test]
    fn age_recommendation_from_months() {
        assert_eq!(extract("what fits a 6 months old?"), Intent::RecommendAge { months: 6 });
    }

    #[test]
    fn age_recommendation_from_years() {
        assert_eq!(extract("my kid is 2 years old"), Intent::RecommendAge { months: 24 });
    }

    #[test]
    fn compound_check_then_buy() {
        let intent =
            extract("if product 5 is in stock, buy 2 of it, confirmation to parent@example.com");
        assert_eq!(
            intent,
            Intent::CheckThenOrder {
                product: ProductQuery::ById(5),
                quantity: 2,
                email: "parent@example.com".to_string(),
            }
        );
    }

    #[test]
    fn pronoun_resolves_against_history() {
        let history = vec![
            ConversationTurn::user("is product 4 available?"),
            ConversationTurn::tool("check_stock product_id 4 available 9"),
            ConversationTurn::assistant("Product 4 has 9 units in stock."),
        ];
        let intent = IntentExtractor::new()
            .extract("great, buy 3 of it, parent@example.com", &history);
        assert_eq!(
            intent,
            Intent::PlaceOrder {
                product: ProductQuery::ById(4),
                quantity: 3,
                email: "parent@example.com".to_string(),
            }
        );
    }

    #[test]
    fn price_bounded_search() {
        let intent = extract("show me formula under 15");
        match intent {
            Intent::Search(filter) => assert_eq!(filter.max_price, Some(15.0)),
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn discount_search_sorts_discount_first() {
        let intent = extract("any deals at the moment?");
        match intent {
            Intent::Search(filter) => {
                assert!(filter.discount_only);
                assert_eq!(filter.sort, SortMode::DiscountFirst);
            }
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn small_talk_asks_for_direction() {
        assert!(matches!(extract("hello there"), Intent::Clarify { .. }));
    }

    #[test]
    fn common_phrases_classify_sensibly() {
        struct Case {
            text: &'static str,
            expect: fn(&Intent) -> bool,
        }

        let cases = vec![
            Case { text: "find fresh milk", expect: |i| matches!(i, Intent::Search(_)) },
            Case { text: "what do you have on sale", expect: |i| matches!(i, Intent::Search(_)) },
            Case {
                text: "show me products under 10",
                expect: |i| matches!(i, Intent::Search(_)),
            },
            Case {
                text: "anything for a 9 months old baby",
                expect: |i| matches!(i, Intent::RecommendAge { months: 9 }),
            },
            Case {
                text: "recommendations for 1 year old",
                expect: |i| matches!(i, Intent::RecommendAge { months: 12 }),
            },
            Case {
                text: "is product 2 available",
                expect: |i| matches!(i, Intent::CheckStock { product: ProductQuery::ById(2) }),
            },
            Case {
                text: "how many units of product 6 are left",
                expect: |i| matches!(i, Intent::CheckStock { product: ProductQuery::ById(6) }),
            },
            Case {
                text: "buy 1 of product 1, mom@example.com",
                expect: |i| matches!(i, Intent::PlaceOrder { quantity: 1, .. }),
            },
            Case {
                text: "purchase 4 packs of product 2 for dad@example.org",
                expect: |i| matches!(i, Intent::PlaceOrder { quantity: 4, .. }),
            },
            Case { text: "order product 2", expect: |i| matches!(i, Intent::Clarify { .. }) },
            Case { text: "thanks!", expect: |i| matches!(i, Intent::Clarify { .. }) },
            Case {
                text: "check stock and buy 2 of product 3, a@b.co",
                expect: |i| matches!(i, Intent::CheckThenOrder { quantity: 2, .. }),
            },
        ];

        let extractor = IntentExtractor::new();
        for (index, case) in cases.iter().enumerate() {
            let intent = extractor.extract(case.text, &[]);
            assert!((case.expect)(&intent), "case {index} `{}` got {intent:?}", case.text);
        }
    }
}

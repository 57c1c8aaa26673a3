//! Core domain for the Cartly conversational commerce assistant.
//!
//! This crate holds everything the rest of the workspace agrees on:
//!
//! - `domain` - catalog entities (products, brands, categories), order
//!   requests/receipts, and conversation turns
//! - `query` - the search filter value object and its translation into a
//!   parameterized catalog query (values are always bound, never inlined)
//! - `errors` - the assistant-facing failure taxonomy with machine-readable
//!   reason codes
//! - `config` - layered configuration (defaults, TOML file, env overrides)
//!
//! Nothing in here performs I/O. Storage, email, and the agent loop live in
//! their own crates and depend on these types.

pub mod config;
pub mod domain;
pub mod errors;
pub mod query;

pub use chrono;
pub use domain::conversation::{ConversationTurn, SessionId, TurnRole};
pub use domain::order::{DispatchStatus, OrderReceipt, OrderRequest};
pub use domain::product::{
    AgeRange, Brand, BrandId, CatalogEntry, Category, CategoryId, Product, ProductId,
};
pub use errors::AssistantError;
pub use query::{translate, ParameterizedQuery, QueryValue, SearchFilter, SortMode};

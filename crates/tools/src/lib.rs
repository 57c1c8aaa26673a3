//! Capability layer: every action the agent can take is a named tool
//! behind a uniform JSON protocol. Arguments are validated against the
//! tool's declared schema before execution, so capabilities never see
//! malformed input.

pub mod order;
pub mod registry;
pub mod schema;
pub mod search;

pub use order::{OrderService, PlaceOrderTool};
pub use registry::{Tool, ToolRegistry};
pub use schema::{ArgKind, ArgSpec, SchemaViolation, ToolSchema};
pub use search::{CatalogSearchTool, CheckStockTool, ProductHit, RecommendByAgeTool, SearchService};

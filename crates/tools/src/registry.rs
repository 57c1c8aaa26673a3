use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use cartly_core::errors::AssistantError;

use crate::schema::ToolSchema;

/// A named capability callable through the uniform JSON protocol.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, args: Value) -> Result<Value, AssistantError>;
}

/// Dispatch table populated once at startup. Arguments are checked
/// against the tool's schema before execution ever runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.schema().name, Box::new(tool));
    }

    pub fn schema_of(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|tool| tool.schema())
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value, AssistantError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AssistantError::not_found(format!("tool `{name}`")))?;

        tool.schema()
            .validate(&args)
            .map_err(|violation| AssistantError::InvalidRequest { message: violation.to_string() })?;

        debug!(tool = name, "dispatching tool call");
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArgKind, ArgSpec};
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new(
                "echo",
                "Echoes its text argument",
                vec![ArgSpec::required("text", ArgKind::String)],
            )
        }

        async fn execute(&self, args: Value) -> Result<Value, AssistantError> {
            Ok(json!({ "echo": args["text"] }))
        }
    }

    #[tokio::test]
    async fn dispatch_validates_then_executes() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);

        let out = registry.dispatch("echo", json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out, json!({ "echo": "hi" }));
    }

    #[tokio::test]
    async fn dispatch_rejects_invalid_args_before_execution() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);

        let error = registry.dispatch("echo", json!({ "text": 7 })).await.unwrap_err();
        assert!(matches!(error, AssistantError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::default();
        let error = registry.dispatch("nope", json!({})).await.unwrap_err();
        assert!(matches!(error, AssistantError::NotFound { .. }));
    }

    #[test]
    fn tool_names_are_sorted() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);
        assert_eq!(registry.tool_names(), vec!["echo"]);
        assert_eq!(registry.len(), 1);
    }
}

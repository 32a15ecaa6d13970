//! Tool contract and registry (§3 Tool, §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// One named, typed parameter of a tool's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    pub fn string(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: "string".to_string(),
            description: description.to_string(),
            enum_values: None,
            required: true,
        }
    }

    pub fn enum_of(name: &str, description: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            param_type: "string".to_string(),
            description: description.to_string(),
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
            required: true,
        }
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: "number".to_string(),
            description: description.to_string(),
            enum_values: None,
            required: true,
        }
    }
}

/// A tool's name, description, and parameter schema, as sent to the
/// dialogue service during `ConfigureSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str, parameters: Vec<ToolParameter>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Render as a JSON Schema object, the shape function-calling services expect.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), Value::String(p.param_type.clone()));
            prop.insert("description".into(), Value::String(p.description.clone()));
            if let Some(values) = &p.enum_values {
                prop.insert(
                    "enum".into(),
                    Value::Array(values.iter().cloned().map(Value::String).collect()),
                );
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }
}

/// A dispatchable action exposed to the dialogue service.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Must return a non-empty string; on adapter failure the string
    /// should begin with `Error: `.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// Registered tools, keyed by name, consumed by the Realtime Client.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name.clone();
        self.tools.insert(name, tool);
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Dispatch by name. Unknown tools yield "Function not found"; handler
    /// errors are stringified as `Error: <message>`.
    pub async fn dispatch(&self, name: &str, args: Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            return "Function not found".to_string();
        };
        match tool.execute(args).await {
            Ok(result) if !result.is_empty() => result,
            Ok(_) => "Error: tool returned an empty result".to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "echoes its input", vec![ToolParameter::string("text", "text to echo")])
        }

        async fn execute(&self, args: Value) -> Result<String, ToolError> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("fails", "always fails", vec![])
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Err(ToolError::new("adapter unavailable"))
        }
    }

    /// Dispatching an unknown tool returns the literal fallback string.
    #[tokio::test]
    async fn unknown_tool_returns_not_found() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.dispatch("nope", serde_json::json!({})).await, "Function not found");
    }

    /// A successful handler's result passes through unchanged.
    #[tokio::test]
    async fn successful_dispatch_passes_through_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry
            .dispatch("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert_eq!(result, "hi");
    }

    /// Handler errors are stringified with an `Error: ` prefix.
    #[tokio::test]
    async fn handler_error_is_prefixed() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let result = registry.dispatch("fails", serde_json::json!({})).await;
        assert_eq!(result, "Error: adapter unavailable");
    }
}

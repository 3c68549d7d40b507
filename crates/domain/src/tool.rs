//! The tool table a session endpoint exposes.
//!
//! Tools from every source (the wrapped CLI, child tool-provider bridges)
//! are flattened into one [`ToolTable`] of `{definition, handler}` rows that
//! is built once per session and then only read.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition advertised to clients via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// Context provided to every tool handler invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Session the call arrived on.
    pub session_id: String,
    /// Name the client used to address the tool.
    pub tool_name: String,
}

/// Result type for tool handlers: the `tools/call` result payload.
pub type ToolResult = Result<Value, ToolError>;

/// Errors a tool handler can return.
///
/// The gateway never lets these escape as transport failures; each one is
/// rendered as a tool result with `isError: true`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Implement this trait to serve a tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, ctx: CallContext, args: Value) -> ToolResult;
}

/// One row of the tool table.
#[derive(Clone)]
pub struct ToolEntry {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    pub fn new(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        Self { definition, handler }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed table of tools. The first registration of a name wins.
#[derive(Clone, Default, Debug)]
pub struct ToolTable {
    entries: BTreeMap<String, ToolEntry>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool. Returns `false` (and keeps the existing row) when the
    /// name is already taken.
    pub fn insert(&mut self, entry: ToolEntry) -> bool {
        let name = entry.name().to_owned();
        if self.entries.contains_key(&name) {
            tracing::warn!(tool = %name, "duplicate tool name, keeping first registration");
            return false;
        }
        self.entries.insert(name, entry);
        true
    }

    /// Insert every entry, skipping duplicates. Returns how many were added.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ToolEntry>) -> usize {
        entries.into_iter().filter(|e| self.insert(e.clone())).count()
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.values().map(|e| e.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch a call by tool name.
    pub async fn call(&self, ctx: CallContext, args: Value) -> ToolResult {
        let entry = self
            .entries
            .get(&ctx.tool_name)
            .ok_or_else(|| ToolError::NotFound(ctx.tool_name.clone()))?;
        entry.handler.call(ctx, args).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result payload helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A successful `tools/call` payload with a single text item.
pub fn text_result(text: impl Into<String>) -> Value {
    serde_json::json!({
        "content": [{ "type": "text", "text": text.into() }],
    })
}

/// A failed `tools/call` payload carrying `{"error": message}` as text.
pub fn error_result(message: impl Into<String>) -> Value {
    let body = serde_json::json!({ "error": message.into() });
    serde_json::json!({
        "content": [{ "type": "text", "text": body.to_string() }],
        "isError": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, ctx: CallContext, args: Value) -> ToolResult {
            Ok(serde_json::json!({ "tool": ctx.tool_name, "args": args }))
        }
    }

    fn entry(name: &str, description: &str) -> ToolEntry {
        ToolEntry::new(
            ToolDefinition {
                name: name.into(),
                description: description.into(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
            Arc::new(Echo),
        )
    }

    fn ctx(tool: &str) -> CallContext {
        CallContext {
            session_id: "s1".into(),
            tool_name: tool.into(),
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut table = ToolTable::new();
        assert!(table.insert(entry("list", "first")));
        assert!(!table.insert(entry("list", "second")));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("list").unwrap().definition.description, "first");
    }

    #[test]
    fn extend_counts_only_new_names() {
        let mut table = ToolTable::new();
        table.insert(entry("a", ""));
        let added = table.extend(vec![entry("a", ""), entry("b", ""), entry("c", "")]);
        assert_eq!(added, 2);
        assert_eq!(table.names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn call_dispatches_by_name() {
        let mut table = ToolTable::new();
        table.insert(entry("echo", ""));
        let out = table
            .call(ctx("echo"), serde_json::json!({ "x": 1 }))
            .await
            .unwrap();
        assert_eq!(out["tool"], "echo");
        assert_eq!(out["args"]["x"], 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let table = ToolTable::new();
        let err = table.call(ctx("nope"), Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".into()));
    }

    #[test]
    fn definition_uses_camel_case_schema_key() {
        let def = entry("x", "d").definition;
        let json = serde_json::to_value(&def).unwrap();
        assert!(json.get("inputSchema").is_some());
    }

    #[test]
    fn error_result_wraps_error_object() {
        let v = error_result("boom");
        assert_eq!(v["isError"], true);
        let text = v["content"][0]["text"].as_str().unwrap();
        let inner: Value = serde_json::from_str(text).unwrap();
        assert_eq!(inner["error"], "boom");
    }
}

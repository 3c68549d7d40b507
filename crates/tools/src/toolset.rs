//! The CLI catalog as tool-table rows.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use tg_domain::tool::{
    error_result, text_result, CallContext, ToolDefinition, ToolEntry, ToolHandler, ToolResult,
};
use tg_sessions::WorkdirStore;

use crate::adapter::CommandAdapter;
use crate::catalog::{ToolSpec, CATALOG, PROJECT_ROOT_ARG};

/// Builds one [`ToolEntry`] per catalog row, all sharing one adapter and
/// the gateway's working-directory store.
#[derive(Clone)]
pub struct CliToolSet {
    adapter: Arc<CommandAdapter>,
    workdirs: Arc<WorkdirStore>,
}

impl CliToolSet {
    pub fn new(adapter: Arc<CommandAdapter>, workdirs: Arc<WorkdirStore>) -> Self {
        Self { adapter, workdirs }
    }

    pub fn entries(&self) -> Vec<ToolEntry> {
        CATALOG
            .iter()
            .map(|spec| {
                ToolEntry::new(
                    definition(spec),
                    Arc::new(CliTool {
                        spec,
                        adapter: Arc::clone(&self.adapter),
                        workdirs: Arc::clone(&self.workdirs),
                    }),
                )
            })
            .collect()
    }
}

pub fn definition(spec: &ToolSpec) -> ToolDefinition {
    ToolDefinition {
        name: spec.name.to_owned(),
        description: spec.description.to_owned(),
        input_schema: spec.input_schema(),
    }
}

struct CliTool {
    spec: &'static ToolSpec,
    adapter: Arc<CommandAdapter>,
    workdirs: Arc<WorkdirStore>,
}

#[async_trait::async_trait]
impl ToolHandler for CliTool {
    /// Never returns `Err`: every failure becomes an `isError` result so a
    /// broken CLI cannot take down the session's request path.
    async fn call(&self, ctx: CallContext, args: Value) -> ToolResult {
        let provided = args.get(PROJECT_ROOT_ARG).and_then(Value::as_str);
        let cwd = self.workdirs.effective_path(&ctx.session_id, provided);

        match self.adapter.invoke(Path::new(&cwd), self.spec, &args).await {
            Ok(out) => Ok(text_result(out.stdout)),
            Err(e) => {
                tracing::info!(
                    session = %ctx.session_id,
                    tool = self.spec.name,
                    cwd = %cwd,
                    error = %e,
                    "CLI tool failed"
                );
                Ok(error_result(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_domain::config::CliTimeouts;
    use tg_sessions::PathResolver;

    #[test]
    fn one_entry_per_catalog_row() {
        let set = CliToolSet::new(
            Arc::new(CommandAdapter::new("tm", ".taskmaster", CliTimeouts::default())),
            Arc::new(WorkdirStore::new(PathResolver::new("", "/workspace"), "/workspace")),
        );
        let entries = set.entries();
        assert_eq!(entries.len(), CATALOG.len());
        let list = entries.iter().find(|e| e.name() == "list-tasks").unwrap();
        assert_eq!(list.definition.input_schema["type"], "object");
    }
}

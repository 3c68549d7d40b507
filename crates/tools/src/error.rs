/// Errors from building or running one CLI invocation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("project not initialized: `{marker}` not found in {cwd}; run `{init_tool}` first")]
    NotInitialized {
        cwd: String,
        marker: String,
        init_tool: String,
    },

    #[error("working directory does not exist: {0}")]
    MissingWorkdir(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("command timed out after {0}s")]
    Timeout(u64),

    #[error("command exited with {}", exit_detail(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("failed to spawn command: {0}")]
    Spawn(String),
}

fn exit_detail(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(c) => format!("status {c}"),
        None => "a signal".into(),
    };
    match stderr.trim() {
        "" => status,
        detail => format!("{status}: {detail}"),
    }
}

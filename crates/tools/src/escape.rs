//! Quoting for values spliced into the CLI invocation line.
//!
//! Values are wrapped in double quotes with `"` and `\` backslash-escaped,
//! so the program receives the literal value even when it contains quotes
//! or spaces.
//!
//! # Residual risk
//!
//! Inside double quotes the shell still expands `$...` and backticks. A
//! value such as `$(rm -rf ~)` is therefore executed by `sh`. Callers that
//! accept untrusted input must filter those sequences themselves.

/// Wrap `value` in double quotes, escaping embedded `"` and `\`.
pub fn quote_arg(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

//! The CLI tool catalog.
//!
//! Each row maps one advertised tool onto a subcommand of the wrapped
//! program. Argument specs drive both the generated input schema and the
//! rendering of JSON arguments into the invocation line.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::CommandError;
use crate::escape::quote_arg;

/// The only tool allowed to run before the project marker exists.
pub const INIT_TOOL: &str = "init-project";

/// Argument consumed by the gateway to set the session's working directory.
/// Never forwarded to the program.
pub const PROJECT_ROOT_ARG: &str = "projectRoot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutClass {
    Read,
    Write,
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

/// How an argument appears on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgForm {
    /// The bare value.
    Positional,
    /// `--flag <value>`.
    Flag(&'static str),
    /// `--flag` when true, nothing otherwise.
    Switch(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub form: ArgForm,
    pub ty: ValueType,
    pub required: bool,
    pub description: &'static str,
}

impl ArgSpec {
    const fn required(name: &'static str, form: ArgForm, description: &'static str) -> Self {
        Self {
            name,
            form,
            ty: ValueType::String,
            required: true,
            description,
        }
    }

    const fn optional(name: &'static str, form: ArgForm, description: &'static str) -> Self {
        Self {
            name,
            form,
            ty: ValueType::String,
            required: false,
            description,
        }
    }

    const fn number(name: &'static str, flag: &'static str, description: &'static str) -> Self {
        Self {
            name,
            form: ArgForm::Flag(flag),
            ty: ValueType::Number,
            required: false,
            description,
        }
    }

    const fn switch(name: &'static str, flag: &'static str, description: &'static str) -> Self {
        Self {
            name,
            form: ArgForm::Switch(flag),
            ty: ValueType::Boolean,
            required: false,
            description,
        }
    }
}

#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub subcommand: &'static str,
    pub description: &'static str,
    pub class: TimeoutClass,
    /// Appended after the subcommand on every call.
    pub fixed: &'static [&'static str],
    pub args: &'static [ArgSpec],
}

const TASK_ID: ArgSpec = ArgSpec::required("id", ArgForm::Flag("--id"), "Task id, e.g. `3` or `3.1`");
const DEPENDS_ON: ArgSpec =
    ArgSpec::required("dependsOn", ArgForm::Flag("--depends-on"), "Id of the task depended on");

pub static CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: INIT_TOOL,
        subcommand: "init",
        description: "Initialize task tracking in the project directory",
        class: TimeoutClass::Init,
        fixed: &["--yes"],
        args: &[
            ArgSpec::optional("projectName", ArgForm::Flag("--name"), "Project name"),
            ArgSpec::optional("description", ArgForm::Flag("--description"), "Project description"),
            ArgSpec::switch("skipInstall", "--skip-install", "Skip dependency installation"),
        ],
    },
    ToolSpec {
        name: "list-tasks",
        subcommand: "list",
        description: "List tasks, optionally filtered by status",
        class: TimeoutClass::Read,
        fixed: &[],
        args: &[
            ArgSpec::optional("status", ArgForm::Flag("--status"), "Only tasks with this status"),
            ArgSpec::switch("withSubtasks", "--with-subtasks", "Include subtasks"),
        ],
    },
    ToolSpec {
        name: "show-task",
        subcommand: "show",
        description: "Show one task with its details and subtasks",
        class: TimeoutClass::Read,
        fixed: &[],
        args: &[ArgSpec::required("id", ArgForm::Positional, "Task id, e.g. `3` or `3.1`")],
    },
    ToolSpec {
        name: "next-task",
        subcommand: "next",
        description: "Show the next task to work on, based on dependencies and status",
        class: TimeoutClass::Read,
        fixed: &[],
        args: &[],
    },
    ToolSpec {
        name: "add-task",
        subcommand: "add-task",
        description: "Add a new task described by a prompt",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[
            ArgSpec::required("prompt", ArgForm::Flag("--prompt"), "What the task is about"),
            ArgSpec::optional(
                "dependencies",
                ArgForm::Flag("--dependencies"),
                "Comma-separated ids this task depends on",
            ),
            ArgSpec::optional("priority", ArgForm::Flag("--priority"), "high, medium or low"),
        ],
    },
    ToolSpec {
        name: "set-task-status",
        subcommand: "set-status",
        description: "Set the status of one or more tasks",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[
            ArgSpec::required("id", ArgForm::Flag("--id"), "Task id, or comma-separated ids"),
            ArgSpec::required("status", ArgForm::Flag("--status"), "New status, e.g. `done`"),
        ],
    },
    ToolSpec {
        name: "update-task",
        subcommand: "update-task",
        description: "Update one task with new information",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[
            TASK_ID,
            ArgSpec::required("prompt", ArgForm::Flag("--prompt"), "What changed"),
        ],
    },
    ToolSpec {
        name: "remove-task",
        subcommand: "remove-task",
        description: "Remove a task permanently",
        class: TimeoutClass::Write,
        fixed: &["--yes"],
        args: &[TASK_ID],
    },
    ToolSpec {
        name: "expand-task",
        subcommand: "expand",
        description: "Break a task into subtasks",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[
            TASK_ID,
            ArgSpec::number("num", "--num", "Number of subtasks to generate"),
            ArgSpec::optional("prompt", ArgForm::Flag("--prompt"), "Extra context for the split"),
            ArgSpec::switch("force", "--force", "Replace existing subtasks"),
        ],
    },
    ToolSpec {
        name: "add-dependency",
        subcommand: "add-dependency",
        description: "Make a task depend on another task",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[TASK_ID, DEPENDS_ON],
    },
    ToolSpec {
        name: "remove-dependency",
        subcommand: "remove-dependency",
        description: "Remove a dependency between two tasks",
        class: TimeoutClass::Write,
        fixed: &[],
        args: &[TASK_ID, DEPENDS_ON],
    },
];

/// Look up a catalog row by tool name.
pub fn find(name: &str) -> Option<&'static ToolSpec> {
    CATALOG.iter().find(|t| t.name == name)
}

impl ToolSpec {
    pub fn requires_marker(&self) -> bool {
        self.name != INIT_TOOL
    }

    /// JSON Schema for the tool's arguments, including `projectRoot`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for arg in self.args {
            let ty = match arg.ty {
                ValueType::String => "string",
                ValueType::Number => "number",
                ValueType::Boolean => "boolean",
            };
            properties.insert(
                arg.name.into(),
                json!({ "type": ty, "description": arg.description }),
            );
            if arg.required {
                required.push(Value::from(arg.name));
            }
        }
        properties.insert(
            PROJECT_ROOT_ARG.into(),
            json!({
                "type": "string",
                "description": "Project directory; remembered for later calls in this session",
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Render JSON arguments into command-line words, in catalog order.
    ///
    /// String values come back already quoted. Unknown keys are ignored.
    pub fn render_args(&self, args: &Value) -> Result<Vec<String>, CommandError> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(CommandError::InvalidArgs(
                    "arguments must be a JSON object".into(),
                ))
            }
        };

        let mut words: Vec<String> = self.fixed.iter().map(|w| (*w).to_owned()).collect();
        for arg in self.args {
            let value = match obj.get(arg.name) {
                None | Some(Value::Null) if arg.required => {
                    return Err(CommandError::InvalidArgs(format!(
                        "missing required argument `{}`",
                        arg.name
                    )))
                }
                None | Some(Value::Null) => continue,
                Some(v) => v,
            };
            match arg.form {
                ArgForm::Switch(flag) => match value {
                    Value::Bool(true) => words.push(flag.to_owned()),
                    Value::Bool(false) => {}
                    _ => return Err(type_error(arg, "a boolean")),
                },
                ArgForm::Positional => words.push(render_value(arg, value)?),
                ArgForm::Flag(flag) => {
                    words.push(flag.to_owned());
                    words.push(render_value(arg, value)?);
                }
            }
        }
        Ok(words)
    }
}

fn render_value(arg: &ArgSpec, value: &Value) -> Result<String, CommandError> {
    match (arg.ty, value) {
        (ValueType::String, Value::String(s)) => Ok(quote_arg(s)),
        (ValueType::String, Value::Number(n)) => Ok(quote_arg(&n.to_string())),
        (ValueType::Number, Value::Number(n)) => Ok(n.to_string()),
        (ValueType::Number, Value::String(s)) if s.trim().parse::<f64>().is_ok() => {
            Ok(s.trim().to_owned())
        }
        (ValueType::Number, _) => Err(type_error(arg, "a number")),
        (ValueType::String, _) => Err(type_error(arg, "a string")),
        (ValueType::Boolean, _) => Err(type_error(arg, "a boolean")),
    }
}

fn type_error(arg: &ArgSpec, expected: &str) -> CommandError {
    CommandError::InvalidArgs(format!("`{}` must be {expected}", arg.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> &'static ToolSpec {
        find(name).unwrap()
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = CATALOG.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn only_init_skips_marker_check() {
        let exempt: Vec<_> = CATALOG
            .iter()
            .filter(|t| !t.requires_marker())
            .map(|t| t.name)
            .collect();
        assert_eq!(exempt, vec![INIT_TOOL]);
        assert_eq!(tool(INIT_TOOL).class, TimeoutClass::Init);
    }

    #[test]
    fn schema_lists_required_and_project_root() {
        let schema = tool("set-task-status").input_schema();
        assert_eq!(schema["required"], json!(["id", "status"]));
        assert_eq!(schema["properties"]["projectRoot"]["type"], "string");
        let expand = tool("expand-task").input_schema();
        assert_eq!(expand["properties"]["num"]["type"], "number");
        assert_eq!(expand["properties"]["force"]["type"], "boolean");
    }

    #[test]
    fn renders_flags_switches_and_positionals() {
        let words = tool("list-tasks")
            .render_args(&json!({ "status": "pending", "withSubtasks": true, "projectRoot": "/x" }))
            .unwrap();
        assert_eq!(words, vec!["--status", "\"pending\"", "--with-subtasks"]);

        let words = tool("show-task").render_args(&json!({ "id": "3.1" })).unwrap();
        assert_eq!(words, vec!["\"3.1\""]);

        let words = tool("expand-task")
            .render_args(&json!({ "id": 4, "num": "5", "force": false }))
            .unwrap();
        assert_eq!(words, vec!["--id", "\"4\"", "--num", "5"]);

        let words = tool("remove-task").render_args(&json!({ "id": "2" })).unwrap();
        assert_eq!(words, vec!["--yes", "--id", "\"2\""]);
    }

    #[test]
    fn embedded_quote_stays_inside_one_word() {
        let words = tool("add-task")
            .render_args(&json!({ "prompt": r#"Rename "foo" to bar"# }))
            .unwrap();
        assert_eq!(words, vec!["--prompt", r#""Rename \"foo\" to bar""#]);
    }

    #[test]
    fn rejects_missing_and_mistyped_values() {
        let err = tool("show-task").render_args(&json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required argument `id`"));

        let err = tool("expand-task")
            .render_args(&json!({ "id": "1", "num": "many" }))
            .unwrap_err();
        assert!(err.to_string().contains("`num` must be a number"));

        let err = tool("list-tasks").render_args(&json!([1])).unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgs(_)));

        assert!(tool("next-task").render_args(&Value::Null).unwrap().is_empty());
    }
}

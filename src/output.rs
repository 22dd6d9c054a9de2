//! Shared output formatting for tally CLI commands.
//!
//! With `--json` every command prints one envelope:
//! `{schema_version, command, status, data | error}`.

use serde::Serialize;

use crate::error::{Error, JsonError, Result};

pub const SCHEMA_VERSION: &str = "tally.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();
        let next_steps = human.map(|h| h.next_steps.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: JsonError,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: JsonError::from(err),
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    lines.push(output.header.clone());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

pub fn infer_command_name_from_args() -> String {
    infer_command_name(std::env::args().skip(1))
}

/// Command name for the envelope, e.g. `task complete`
pub fn infer_command_name<I>(args: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut skip_value = false;
    let mut words = Vec::new();

    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg.starts_with('-') {
            // Global flags that take a separate value.
            skip_value = matches!(arg.as_str(), "--data-dir" | "--user");
            continue;
        }
        words.push(arg);
        let nested = matches!(words[0].as_str(), "task" | "account");
        if words.len() == 2 || !nested {
            break;
        }
    }

    if words.is_empty() {
        "tally".to_string()
    } else {
        words.join(" ")
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::NotFound(what) if what.starts_with("account") => {
            vec!["tally account open".to_string()]
        }
        Error::Transaction { task_id } => vec![format!("tally task complete {task_id}")],
        Error::InvalidConfig(_) => vec!["fix tally.toml then retry".to_string()],
        Error::InvalidArgument(message) if message.contains("acting user") => {
            vec!["tally --user <id> ...".to_string()]
        }
        Error::LockFailed(_) => vec!["retry; another process holds the lock".to_string()],
        Error::JournalConflict { txn_id } => vec![
            format!("inspect journal/{txn_id}.json and repair the documents it names"),
            "tally recover".to_string(),
        ],
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_name_includes_subcommand() {
        assert_eq!(infer_command_name(args(&["task", "complete", "01h"])), "task complete");
        assert_eq!(
            infer_command_name(args(&["--user", "bob", "--json", "account", "show"])),
            "account show"
        );
        assert_eq!(infer_command_name(args(&["--data-dir", "/tmp/x", "view"])), "view");
        assert_eq!(infer_command_name(args(&["--json"])), "tally");
    }

    #[test]
    fn human_output_sections() {
        let mut human = HumanOutput::new("tally view");
        human.push_summary("points", "52");
        human.push_detail("01h: YouTube Like (2 pts)");
        human.push_next_step("tally task complete <id>");

        let text = format_human(&human);
        assert!(text.starts_with("tally view"));
        assert!(text.contains("- points: 52"));
        assert!(text.contains("Details:\n- 01h"));
        assert!(text.contains("Next steps:"));
        assert!(!text.contains("Warnings:"));
    }
}

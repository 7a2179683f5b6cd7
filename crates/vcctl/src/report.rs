use chrono::{DateTime, Utc};
use miette::Diagnostic;
use vc_manager::VmError;
use vc_manager::props::format_timestamp;

const RULE: &str =
    "********************************************************************************************";

fn heading(lines: &mut Vec<String>, title: &str) {
    lines.push(RULE.to_string());
    lines.push(format!("\t\t\t\t  {title}"));
    lines.push(RULE.to_string());
}

/// Render the block printed when a command fails. `now` is the remote clock,
/// if it could still be read.
pub fn error_block(err: &VmError, now: Option<DateTime<Utc>>) -> Vec<String> {
    let mut lines = vec![String::new()];
    heading(&mut lines, "Error Found");
    lines.push(format!(
        "The last attempted operation cannot be performed due to \"{err}\""
    ));
    lines.push("error occurred.".to_string());
    lines.push(String::new());

    if matches!(err, VmError::InvalidPowerState { .. }) {
        heading(&mut lines, "Description");
        lines.push("Virtual Machine is in an invalid power state !!!".to_string());
        lines.push(String::new());

        heading(&mut lines, "  Reason");
        if let Some(help) = err.help() {
            lines.push(help.to_string());
        }
        lines.push(String::new());
    }

    let time = now
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "unavailable".to_string());
    lines.push(format!("Time : {time} when error occurred."));
    lines.push(RULE.to_string());
    lines
}

// Runs the platform's log query tool and hands back its raw text.

use std::process::Command;

use super::error::{Result, ServiceError};
use super::model::Scope;

/// Builds the `journalctl` arguments for one unit.
pub fn journalctl_args(scope: Scope, unit: &str, max_lines: usize) -> Vec<String> {
    let mut args = Vec::new();
    if !scope.is_privileged() {
        args.push("--user".to_string());
    }
    args.extend([
        "-u".to_string(),
        unit.to_string(),
        "-n".to_string(),
        max_lines.to_string(),
        "--no-pager".to_string(),
    ]);
    args
}

/// Builds the PowerShell command reading a service's Application event log.
pub fn event_log_args(unit: &str, max_lines: usize) -> Vec<String> {
    let source = unit.replace('\'', "''");
    vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        format!(
            "Get-EventLog -LogName Application -Source '{source}' -Newest {max_lines} | \
             Sort-Object Index | Format-Table -AutoSize -Wrap TimeGenerated,EntryType,Message"
        ),
    ]
}

/// Runs `program` and returns stdout followed by stderr.
pub fn run_log_query(program: &str, args: &[String]) -> Result<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        ServiceError::BackendUnavailable(format!("failed to execute {program}: {e}"))
    })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(ServiceError::BackendUnavailable(format!(
            "{program} failed ({}): {}",
            output.status,
            text.trim()
        )));
    }
    Ok(text)
}

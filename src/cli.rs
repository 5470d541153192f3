// One-shot commands. Output goes to the given writer, errors bubble up to main.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::DateTime;

use crate::manager::{ServiceAction, ServiceDetails, ServiceManager, ServiceUnit};

pub fn list(manager: &ServiceManager, out: &mut impl Write) -> Result<()> {
    let services = manager
        .list_services()
        .context("failed to list services")?;
    write!(out, "{}", format_list(&services))?;
    Ok(())
}

pub fn control(
    manager: &ServiceManager,
    action: ServiceAction,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    manager
        .control(action, name)
        .with_context(|| format!("failed to {} {}", action, name))?;
    writeln!(out, "{} {}", manager.normalize(name), action.past())?;
    Ok(())
}

pub fn status(manager: &ServiceManager, name: &str, out: &mut impl Write) -> Result<()> {
    let details = manager
        .service_details(name)
        .with_context(|| format!("failed to query {}", name))?;
    write!(out, "{}", format_status(&details))?;
    Ok(())
}

pub fn logs(
    manager: &ServiceManager,
    name: &str,
    max_lines: usize,
    out: &mut impl Write,
) -> Result<()> {
    let text = manager
        .logs(name, max_lines)
        .with_context(|| format!("failed to fetch logs for {}", name))?;
    write!(out, "{}", text)?;
    if !text.is_empty() && !text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

pub fn format_list(services: &[ServiceUnit]) -> String {
    let mut text = format!(
        "{:<40} {:<12} {:<12} {}\n",
        "NAME", "ACTIVE", "SUB", "DESCRIPTION"
    );
    for s in services {
        text.push_str(&format!(
            "{:<40} {:<12} {:<12} {}\n",
            s.name, s.active_state, s.sub_state, s.description
        ));
    }
    text
}

/// Renders a status block in the shape `systemctl status` uses.
pub fn format_status(details: &ServiceDetails) -> String {
    let unit = &details.unit;
    let mut text = format!("● {} - {}\n", unit.name, unit.description);

    if details.fragment_path.is_empty() {
        text.push_str(&format!("     Loaded: {}\n", unit.load_state));
    } else {
        text.push_str(&format!(
            "     Loaded: {} ({})\n",
            unit.load_state, details.fragment_path
        ));
    }

    text.push_str(&format!(
        "     Active: {} ({})",
        unit.active_state, unit.sub_state
    ));
    let since = if unit.active_state == "active" {
        details.active_enter_timestamp
    } else {
        details.inactive_enter_timestamp
    };
    if let Some(since) = format_timestamp(since) {
        text.push_str(&format!(" since {}", since));
    }
    text.push('\n');

    if details.main_pid != 0 {
        text.push_str(&format!("   Main PID: {}\n", details.main_pid));
    }
    text
}

/// Microseconds since the epoch to a UTC timestamp; 0 means never.
fn format_timestamp(micros: u64) -> Option<String> {
    if micros == 0 {
        return None;
    }
    let micros = i64::try_from(micros).ok()?;
    DateTime::from_timestamp_micros(micros).map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

//! Table rendering and value formatting for the shell.
//!
//! Everything here builds plain strings so the output is testable; the
//! shell prints them as-is.

use std::fmt::Write as _;

use crate::{
    commands::Command,
    types::{DeviceInfo, DeviceStatus, SpeedRange},
};

/// Startup banner
#[must_use]
pub fn banner() -> String {
    let lines = [
        "treadctl - FTMS machine control",
        "Type 'help' for commands, 'quit' to exit",
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "┌─{}─┐", "─".repeat(width));
    for line in lines {
        let _ = writeln!(out, "│ {line:<width$} │");
    }
    let _ = write!(out, "└─{}─┘", "─".repeat(width));
    out
}

/// Render the telemetry snapshot as a two-column table
#[must_use]
pub fn status_table(status: &DeviceStatus) -> String {
    let rows = [
        ("Status", status.state.to_string()),
        ("Speed", format_speed(status.speed_kmh)),
        ("Distance", format_distance(status.distance_m)),
        ("Time", format_time(status.elapsed_s)),
        ("Steps", format_count(status.steps)),
        ("Energy", format_energy(status.energy_kcal)),
    ];
    render_table(&rows)
}

/// Render device information and speed constraints
#[must_use]
pub fn info_table(info: &DeviceInfo, range: SpeedRange) -> String {
    let rows = [
        ("Name", info.name.clone()),
        ("Address", info.address.clone()),
        ("RSSI", format!("{} dBm", info.rssi)),
        (
            "Speed range",
            format!("{:.1}-{:.1} km/h", range.min, range.max),
        ),
        ("Speed step", format!("{:.2} km/h", range.step)),
    ];
    render_table(&rows)
}

/// Render the command listing for `help`
#[must_use]
pub fn help_table(commands: &[Command]) -> String {
    let mut out = String::from("Available commands:\n");
    for cmd in commands {
        let aliases = if cmd.aliases.is_empty() {
            String::from("-")
        } else {
            cmd.aliases.join(", ")
        };
        let _ = writeln!(
            out,
            "  {:<14} {:<10} {}",
            cmd.usage, aliases, cmd.description
        );
    }
    out.push_str("Commands are case-insensitive; Enter exits the live view.");
    out
}

/// One-line error message
#[must_use]
pub fn error_line(message: &str) -> String {
    format!("Error: {message}")
}

/// One-line informational message
#[must_use]
pub fn info_line(message: &str) -> String {
    format!("Info: {message}")
}

/// Format elapsed seconds as M:SS
#[must_use]
pub fn format_time(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format a speed in km/h
#[must_use]
pub fn format_speed(km_h: f32) -> String {
    format!("{km_h:.1} km/h")
}

/// Format a distance, switching to kilometers above 1000 m
#[must_use]
pub fn format_distance(meters: u32) -> String {
    if meters >= 1000 {
        format!("{:.2} km", f64::from(meters) / 1000.0)
    } else {
        format!("{meters} m")
    }
}

/// Format an energy total
#[must_use]
pub fn format_energy(kcal: u32) -> String {
    format!("{kcal} kcal")
}

fn format_count(count: u32) -> String {
    count.to_string()
}

fn render_table(rows: &[(&str, String)]) -> String {
    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "┌─{}─┬─{}─┐", "─".repeat(key_width), "─".repeat(value_width));
    for (key, value) in rows {
        let _ = writeln!(out, "│ {key:<key_width$} │ {value:<value_width$} │");
    }
    let _ = write!(out, "└─{}─┴─{}─┘", "─".repeat(key_width), "─".repeat(value_width));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrainingState;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(59), "0:59");
        assert_eq!(format_time(125), "2:05");
        assert_eq!(format_time(3600), "60:00");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(4.5), "4.5 km/h");
        assert_eq!(format_speed(0.0), "0.0 km/h");
    }

    #[test]
    fn test_format_distance_switches_units() {
        assert_eq!(format_distance(0), "0 m");
        assert_eq!(format_distance(999), "999 m");
        assert_eq!(format_distance(1000), "1.00 km");
        assert_eq!(format_distance(2500), "2.50 km");
    }

    #[test]
    fn test_format_energy() {
        assert_eq!(format_energy(45), "45 kcal");
    }

    #[test]
    fn test_status_table_contains_all_rows() {
        let status = DeviceStatus {
            state: TrainingState::ManualMode,
            speed_kmh: 4.5,
            distance_m: 1240,
            elapsed_s: 125,
            steps: 156,
            energy_kcal: 12,
            ..Default::default()
        };
        let table = status_table(&status);
        assert!(table.contains("MANUAL_MODE"));
        assert!(table.contains("4.5 km/h"));
        assert!(table.contains("1.24 km"));
        assert!(table.contains("2:05"));
        assert!(table.contains("156"));
        assert!(table.contains("12 kcal"));
    }

    #[test]
    fn test_help_table_lists_every_command() {
        let table = help_table(crate::commands::COMMANDS);
        for cmd in crate::commands::COMMANDS {
            assert!(table.contains(cmd.usage), "missing usage for {}", cmd.name);
        }
    }

    #[test]
    fn test_message_lines() {
        assert_eq!(error_line("boom"), "Error: boom");
        assert_eq!(info_line("connected"), "Info: connected");
    }
}

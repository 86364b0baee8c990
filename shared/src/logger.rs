//! Timestamped, colorized console logging shared by all three binaries.
//!
//! Persistent structured logs (CSV / rolling files) are an external
//! collaborator and are intentionally not implemented here; `log_event`
//! is the in-process substitute used to narrate the event taxonomy
//! (`Sent`, `Acknowledged`, `Retransmit`, `Dropped`, `Delayed`, ...).

use chrono::Local;
use colored::Colorize;

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

pub fn log_info(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", timestamp()).dimmed(),
        "[INFO]".cyan().bold(),
        message
    );
}

pub fn log_success(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", timestamp()).dimmed(),
        "[OK]".green().bold(),
        message
    );
}

pub fn log_warning(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", timestamp()).dimmed(),
        "[WARN]".yellow().bold(),
        message
    );
}

pub fn log_error(message: &str) {
    eprintln!(
        "{} {} {}",
        format!("[{}]", timestamp()).dimmed(),
        "[ERROR]".red().bold(),
        message
    );
}

/// Logs one protocol event (`event`: e.g. `"Forwarded"`, `"Dropped"`,
/// `"Duplicate"`, `"Out-of-Order"`) with a free-form detail string.
pub fn log_event(event: &str, detail: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", timestamp()).dimmed(),
        format!("[{event}]").magenta().bold(),
        detail
    );
}

//! Visual styling utilities for the CLI.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for scanning operations.
pub fn scanning_spinner(timeout_secs: u64) -> ProgressBar {
    spinner(format!("Scanning for sensor boards... ({}s)", timeout_secs))
}

/// Create a spinner shown while the session connects.
pub fn connecting_spinner() -> ProgressBar {
    spinner("Waiting for a sensor board...".to_string())
}

/// Render one relay state, coloured unless `no_color`.
pub fn relay_state(on: bool, no_color: bool) -> String {
    let label = if on { "ON" } else { "off" };
    if no_color {
        label.to_string()
    } else if on {
        label.green().bold().to_string()
    } else {
        label.dimmed().to_string()
    }
}

/// Render a connection phase label.
pub fn phase(label: &str, streaming: bool, no_color: bool) -> String {
    if no_color {
        label.to_string()
    } else if streaming {
        label.cyan().to_string()
    } else {
        label.yellow().to_string()
    }
}

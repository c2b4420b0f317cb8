// src/utils/console.rs

//! Presentation helpers for CLI progress output.
//!
//! Everything is routed through the `log` facade so `env_logger` decides
//! formatting and filtering.

const WIDTH: usize = 60;

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Render a summary block as plain lines, for callers that print directly.
pub fn summary_lines(title: &str, items: &[(&str, String)]) -> Vec<String> {
    let key_width = items.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(format!("[SUMMARY] {}", title));
    for (key, value) in items {
        lines.push(format!("    {:<width$}  {}", key, value, width = key_width));
    }
    lines
}

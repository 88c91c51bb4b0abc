//! Colored status lines and number formatting for the summary

use owo_colors::OwoColorize;

/// Status message helpers
pub struct Status;

impl Status {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue(), message);
    }

    /// Print a header
    pub fn header(message: &str) {
        println!();
        println!("{}", message.bold());
        println!("{}", "─".repeat(message.chars().count()));
    }

    /// Print an aligned `label: value` line
    pub fn field(label: &str, value: impl std::fmt::Display) {
        println!("  {:<22} {}", format!("{label}:").dimmed(), value);
    }
}

/// Human form of a millisecond count, e.g. `420ms`, `12.5s`, `3m 05s`
pub fn format_millis(ms: u64) -> String {
    match ms {
        0..=999 => format!("{ms}ms"),
        1_000..=59_999 => format!("{:.1}s", ms as f64 / 1000.0),
        _ => format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1000),
    }
}

/// Format a count with singular/plural
pub fn format_count(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(420), "420ms");
        assert_eq!(format_millis(12_500), "12.5s");
        assert_eq!(format_millis(185_000), "3m 05s");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(1, "batch", "batches"), "1 batch");
        assert_eq!(format_count(0, "batch", "batches"), "0 batches");
    }
}

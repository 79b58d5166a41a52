//! Formatting utilities used for CLI outputs.

pub fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

pub fn italic(s: &str) -> String {
    format!("\x1b[3m{}\x1b[0m", s)
}

pub fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

/// 3.5 → "03h 30m"
pub fn hours2readable(hours: f64) -> String {
    let mins = (hours * 60.0).round() as i64;
    format!("{:02}h {:02}m", mins / 60, mins % 60)
}

//! Console output shared by the commands: one-line messages with an icon,
//! section headers, questions and the auto-save indicator.

use crate::core::autosave::SaveStatus;
use crate::utils::colors::{CYAN, GREEN, GREY, RED, RESET, YELLOW};
use std::fmt;

const BOLD: &str = "\x1b[1m";

/// Icons
const ICON_INFO: &str = "ℹ️";
const ICON_OK: &str = "✅";
const ICON_WARN: &str = "⚠️";
const ICON_ERR: &str = "❌";
const ICON_ASK: &str = "❓";

pub fn info<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", CYAN, BOLD, ICON_INFO, RESET, msg);
}

pub fn success<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", GREEN, BOLD, ICON_OK, RESET, msg);
}

/// Recoverable problems, including rejected input.
pub fn warning<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", YELLOW, BOLD, ICON_WARN, RESET, msg);
}

pub fn error<T: fmt::Display>(msg: T) {
    eprintln!("{}{}{} {}{}", RED, BOLD, ICON_ERR, RESET, msg);
}

pub fn header<T: fmt::Display>(msg: T) {
    println!("{}{}── {} ──{}", CYAN, BOLD, msg, RESET);
}

/// A question answered on the next input line.
pub fn ask<T: fmt::Display>(msg: T) {
    println!("{} {}", ICON_ASK, msg);
}

/// Indented list of selectable values under the current line.
pub fn choices<T: fmt::Display>(label: &str, values: T) {
    println!("    {}{}:{} {}", GREY, label, RESET, values);
}

/// Coloured auto-save indicator; empty while idle.
pub fn save_indicator(status: &SaveStatus) -> String {
    let color = match status {
        SaveStatus::Idle => return String::new(),
        SaveStatus::Saving => GREY,
        SaveStatus::Saved => GREEN,
        SaveStatus::Error(_) => RED,
    };
    format!("{}{}{}", color, status.label(), RESET)
}

//! ANSI colour codes for terminal output.

use crate::models::shift::ShiftStatus;

pub const RESET: &str = "\x1b[0m";

pub const GREY: &str = "\x1b[90m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";

pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

pub fn color_for_status(status: &ShiftStatus) -> &'static str {
    match status {
        ShiftStatus::Approved | ShiftStatus::Paid => GREEN,
        ShiftStatus::Rejected => RED,
        ShiftStatus::Pending => YELLOW,
        ShiftStatus::InProgress => CYAN,
    }
}

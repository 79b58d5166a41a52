pub mod gaps;
pub mod totals;

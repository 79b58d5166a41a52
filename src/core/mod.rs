pub mod autosave;
pub mod calculator;
pub mod clock;
pub mod log;
pub mod picker;
pub mod recovery;
pub mod sequence;
pub mod session;

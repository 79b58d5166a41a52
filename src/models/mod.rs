pub mod shift;
pub mod time_block;

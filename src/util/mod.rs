//! Timing and formatting utilities

pub mod fast_time;
pub mod time;

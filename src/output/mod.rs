//! Result output
//!
//! - [`text`]: console report
//! - [`json`]: JSON summary file
//! - [`histogram_file`]: HdrHistogram V2 dump of the latency distribution

pub mod histogram_file;
pub mod json;
pub mod text;

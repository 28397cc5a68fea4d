//! Utils Module
pub mod truncate;

pub use truncate::{head_chars, truncate_text, TruncationPolicy};

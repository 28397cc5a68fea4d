//! Segment Module
//!
//! Splitting a game log into plate appearance segments: scorer-vocabulary
//! predicates, the deterministic segmenter, and the model-backed refiner.

pub mod patterns;
pub mod refiner;
pub mod segmenter;

pub use refiner::{post_merge, RefinerOptions, SegmentRefiner};
pub use segmenter::deterministic_segment;

//! Green Seam
//!
//! Turns free-text youth baseball play-by-play into validated plate
//! appearance records and per-hitter scouting cards:
//! - Deterministic segmentation with optional model refinement
//! - Schema-validated canonicalization with retries, self-check and caching
//! - Name backfill and corpus-wide alias resolution
//! - Hitter aggregation with development and exploit recommendations

pub mod canon;
pub mod cards;
pub mod config;
pub mod error;
pub mod llm;
pub mod names;
pub mod orchestrator;
pub mod segment;
pub mod utils;

// Re-exports for convenience
pub use canon::{GameContext, PlateAppearanceCanonical};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use llm::LLMProvider;
pub use orchestrator::ExtractionPipeline;

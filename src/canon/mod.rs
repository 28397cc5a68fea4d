//! Canon Module
//!
//! The plate appearance record, its schema and validator, and the
//! canonicalizer that produces it.

pub mod cache;
pub mod canonicalizer;
pub mod heuristics;
pub mod schema;
pub mod types;
pub mod validator;

pub use cache::{cache_key, CanonCache};
pub use canonicalizer::{CanonState, Canonicalizer, CanonicalizerOptions};
pub use heuristics::{deterministic_record, micro_heuristic, minimal_from_text};
pub use schema::{canonical_schema, SCHEMA_VERSION};
pub use types::{
    GameContext, Half, PaResult, PitchEvent, PlateAppearanceCanonical, PlateAppearanceDraft,
    RunnerAction, RunnerActionKind, Score,
};
pub use validator::{validate_record, validate_value, ValidationReport};

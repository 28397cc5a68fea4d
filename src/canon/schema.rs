//! Record Schema
//!
//! The Draft-07 schema for `PlateAppearanceCanonical` ships with the crate and
//! is the contract both the validator and the model prompts use.

use serde_json::Value;

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_TEXT: &str = include_str!("../../schema/plate_appearance_canonical.schema.json");

lazy_static::lazy_static! {
    static ref SCHEMA: Value = serde_json::from_str(SCHEMA_TEXT)
        .expect("embedded plate appearance schema is valid JSON");
    static ref SCHEMA_COMPACT: String = SCHEMA.to_string();
}

/// Parsed schema document.
pub fn canonical_schema() -> &'static Value {
    &SCHEMA
}

/// Single-line rendering for prompts.
pub fn schema_for_prompt() -> &'static str {
    &SCHEMA_COMPACT
}

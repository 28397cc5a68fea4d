//! Names Module
//!
//! Batter and pitcher identities: extraction from text, backfill across
//! neighbouring segments, and corpus-wide alias resolution.

pub mod alias;
pub mod backfill;
pub mod extract;

pub use alias::{apply_aliases, build_alias_map, classify_name, AliasResolution, NameClass};
pub use backfill::backfill_identities;
pub use extract::{extract_names, normalize_short_name, ExtractedNames, NameSource};

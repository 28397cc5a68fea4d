//! Batch Reports
//!
//! Outbound shapes. Each report carries partial results next to the error
//! list; `ok` is advisory and the caller decides what counts as failure.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canon::PlateAppearanceCanonical;
use crate::cards::HitterCard;
use crate::config::PipelineConfig;

/// Extraction output. `segments[i]` is the source text of `data[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub ok: bool,
    pub data: Vec<PlateAppearanceCanonical>,
    pub segments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardsReport {
    pub ok: bool,
    pub cards: Vec<HitterCard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CardsReport {
    pub(crate) fn failed(errors: Vec<String>) -> Self {
        Self {
            ok: false,
            cards: Vec::new(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub segmentation: String,
    pub canonicalization: String,
    pub recommendation: String,
    pub model: String,
    pub timeout_ms: u64,
    pub pa_total: usize,
    pub deterministic: bool,
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraction_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendation_errors: Vec<String>,
}

/// Combined extraction and cards output for one game log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub ok: bool,
    pub meta: RunMeta,
    pub hitters: Vec<HitterCard>,
}

/// `deterministic:<sha256 of input>` for deterministic runs, so identical
/// input serializes identically; otherwise the current RFC 3339 time.
pub fn generated_at(config: &PipelineConfig, raw: &str) -> String {
    if config.deterministic {
        let digest = Sha256::digest(raw.as_bytes());
        format!("deterministic:{}", hex::encode(digest))
    } else {
        chrono::Utc::now().to_rfc3339()
    }
}

impl RunMeta {
    pub fn new(config: &PipelineConfig, raw: &str, pa_total: usize) -> Self {
        Self {
            segmentation: config.segmentation.as_str().to_string(),
            canonicalization: config.canonicalization.as_str().to_string(),
            recommendation: config.recommendation.as_str().to_string(),
            model: config.model.clone(),
            timeout_ms: config.timeout_ms,
            pa_total,
            deterministic: config.deterministic,
            generated_at: generated_at(config, raw),
            extraction_errors: Vec::new(),
            recommendation_errors: Vec::new(),
        }
    }
}

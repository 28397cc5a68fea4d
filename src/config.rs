//! Pipeline Configuration
//!
//! Modes and tunables for one extraction run. Values come from defaults, a
//! JSON file, or `GS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const MIN_CACHE_CAPACITY: usize = 50;

/// How raw text is split into plate appearances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentationMode {
    #[serde(rename = "det", alias = "deterministic")]
    Deterministic,
    #[serde(rename = "llm", alias = "model")]
    Model,
    #[default]
    #[serde(rename = "hybrid")]
    Hybrid,
}

/// Whether a stage calls the model or stays on fixed rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StageMode {
    #[default]
    #[serde(rename = "llm", alias = "model")]
    Model,
    #[serde(rename = "det", alias = "deterministic")]
    Deterministic,
}

impl SegmentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::Deterministic => "det",
            SegmentationMode::Model => "llm",
            SegmentationMode::Hybrid => "hybrid",
        }
    }
}

impl StageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageMode::Model => "llm",
            StageMode::Deterministic => "det",
        }
    }

    pub fn is_deterministic(&self) -> bool {
        *self == StageMode::Deterministic
    }
}

impl FromStr for SegmentationMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "det" | "deterministic" => Ok(SegmentationMode::Deterministic),
            "llm" | "model" => Ok(SegmentationMode::Model),
            "hybrid" => Ok(SegmentationMode::Hybrid),
            other => Err(PipelineError::Input(format!("unknown segmentation mode '{}'", other))),
        }
    }
}

impl FromStr for StageMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "det" | "deterministic" => Ok(StageMode::Deterministic),
            "llm" | "model" => Ok(StageMode::Model),
            other => Err(PipelineError::Input(format!("unknown stage mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: String,
    pub segmentation: SegmentationMode,
    pub canonicalization: StageMode,
    pub recommendation: StageMode,
    /// Per-call transport timeout
    pub timeout_ms: u64,
    pub canon_retries: usize,
    pub segmentation_retries: usize,
    pub cards_retries: usize,
    pub canon_concurrency: usize,
    pub segmentation_concurrency: usize,
    pub cards_concurrency: usize,
    pub cache_capacity: usize,
    /// Issue one corrective request after the retry budget is spent.
    pub self_check: bool,
    /// Refiner chunk limits
    pub max_chunk_chars: usize,
    pub max_chunk_pas: usize,
    pub strict_aliases: bool,
    /// Raw spelling to canonical name, applied before inference.
    pub aliases: BTreeMap<String, String>,
    /// Stable `generated_at` marker and no wall-clock output.
    pub deterministic: bool,
    pub requests_per_minute: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            segmentation: SegmentationMode::Hybrid,
            canonicalization: StageMode::Model,
            recommendation: StageMode::Model,
            timeout_ms: 45_000,
            canon_retries: 3,
            segmentation_retries: 2,
            cards_retries: 2,
            canon_concurrency: 3,
            segmentation_concurrency: 2,
            cards_concurrency: 4,
            cache_capacity: 200,
            self_check: true,
            max_chunk_chars: 2000,
            max_chunk_pas: 10,
            strict_aliases: true,
            aliases: BTreeMap::new(),
            deterministic: false,
            requests_per_minute: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    Some(matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl PipelineConfig {
    /// No model calls anywhere; output is byte-identical across runs.
    pub fn deterministic() -> Self {
        Self {
            segmentation: SegmentationMode::Deterministic,
            canonicalization: StageMode::Deterministic,
            recommendation: StageMode::Deterministic,
            canon_retries: 1,
            segmentation_retries: 1,
            cards_retries: 1,
            canon_concurrency: 1,
            segmentation_concurrency: 1,
            cards_concurrency: 1,
            deterministic: true,
            ..Self::default()
        }
    }

    /// Defaults overridden by `GS_*` variables (and `OPENAI_TIMEOUT_MS`).
    pub fn from_env() -> PipelineResult<Self> {
        let mut config = if env_flag("GS_DETERMINISTIC").unwrap_or(false) {
            Self::deterministic()
        } else {
            Self::default()
        };

        if let Ok(model) = std::env::var("GS_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(mode) = std::env::var("GS_SEG_MODE") {
            config.segmentation = mode.parse()?;
        }
        if let Ok(mode) = std::env::var("GS_CANON_MODE") {
            config.canonicalization = mode.parse()?;
        }
        if let Ok(mode) = std::env::var("GS_REC_MODE") {
            config.recommendation = mode.parse()?;
        }

        if let Some(v) = env_parse("OPENAI_TIMEOUT_MS") {
            config.timeout_ms = v;
        }
        if let Some(v) = env_parse("GS_CANON_CONCURRENCY") {
            config.canon_concurrency = v;
        }
        if let Some(v) = env_parse("GS_SEG_LLM_CONCURRENCY") {
            config.segmentation_concurrency = v;
        }
        if let Some(v) = env_parse("GS_CARDS_CONCURRENCY") {
            config.cards_concurrency = v;
        }
        if let Some(v) = env_parse("GS_CANON_RETRIES") {
            config.canon_retries = v;
        }
        if let Some(v) = env_parse("GS_SEG_RETRIES") {
            config.segmentation_retries = v;
        }
        if let Some(v) = env_parse("GS_CARDS_RETRIES") {
            config.cards_retries = v;
        }
        if let Some(v) = env_parse::<usize>("GS_CANON_CACHE_MAX") {
            config.cache_capacity = v.max(MIN_CACHE_CAPACITY);
        }
        if let Some(v) = env_parse("GS_REQUESTS_PER_MINUTE") {
            config.requests_per_minute = Some(v);
        }
        if let Some(strict) = env_flag("GS_STRICT_ALIASES") {
            config.strict_aliases = strict;
        }
        if let Ok(raw) = std::env::var("GS_ALIASES") {
            config.aliases = serde_json::from_str(&raw)
                .map_err(|e| PipelineError::Input(format!("GS_ALIASES is not a JSON object of strings: {}", e)))?;
        }

        Ok(config.normalized())
    }

    /// Read a JSON config file; missing keys keep their defaults.
    pub async fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Input(format!("cannot read config {}: {}", path.display(), e)))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Input(format!("invalid config {}: {}", path.display(), e)))?;
        Ok(config.normalized())
    }

    /// Clamp counts to at least one.
    pub fn normalized(mut self) -> Self {
        self.canon_retries = self.canon_retries.max(1);
        self.segmentation_retries = self.segmentation_retries.max(1);
        self.cards_retries = self.cards_retries.max(1);
        self.canon_concurrency = self.canon_concurrency.max(1);
        self.segmentation_concurrency = self.segmentation_concurrency.max(1);
        self.cards_concurrency = self.cards_concurrency.max(1);
        self.cache_capacity = self.cache_capacity.max(1);
        self.max_chunk_chars = self.max_chunk_chars.max(1);
        self.max_chunk_pas = self.max_chunk_pas.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether any stage needs a completion provider.
    pub fn needs_model(&self) -> bool {
        self.segmentation != SegmentationMode::Deterministic
            || !self.canonicalization.is_deterministic()
            || !self.recommendation.is_deterministic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.model, "gpt-5-mini");
        assert_eq!(config.timeout(), Duration::from_millis(45_000));
        assert_eq!(
            (config.canon_concurrency, config.segmentation_concurrency, config.cards_concurrency),
            (3, 2, 4)
        );
        assert!(config.needs_model());
        assert!(config.strict_aliases);
        assert!(!PipelineConfig::deterministic().needs_model());
        assert!(PipelineConfig::deterministic().strict_aliases);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("det".parse::<SegmentationMode>().unwrap(), SegmentationMode::Deterministic);
        assert_eq!("LLM".parse::<StageMode>().unwrap(), StageMode::Model);
        assert!("sometimes".parse::<SegmentationMode>().is_err());
        assert_eq!(
            serde_json::to_value(SegmentationMode::Hybrid).unwrap(),
            serde_json::json!("hybrid")
        );
    }

    #[test]
    fn test_normalized_clamps_zero() {
        let config = PipelineConfig {
            canon_retries: 0,
            cards_concurrency: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.canon_retries, 1);
        assert_eq!(config.cards_concurrency, 1);
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "local-llama", "segmentation": "det", "aliases": {{"JM": "John Miller"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).await.unwrap();
        assert_eq!(config.model, "local-llama");
        assert_eq!(config.segmentation, SegmentationMode::Deterministic);
        assert_eq!(config.aliases.get("JM").map(String::as_str), Some("John Miller"));
        assert_eq!(config.canon_retries, 3);
        assert!(config.strict_aliases);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = PipelineConfig::load(file.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
    }
}

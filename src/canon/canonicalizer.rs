//! Canonicalizer
//!
//! Turns one segment plus game context into a validated record. Model mode
//! runs a bounded state machine per segment:
//!
//! ```text
//! Pending -> Validating -> Succeeded
//!               |  ^
//!               v  |
//!           Retrying(n) -> SelfChecking -> Succeeded | Failed
//! ```
//!
//! Transport failures and timeouts consume an attempt exactly like invalid
//! replies do.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{cache_key, CanonCache};
use super::heuristics::{deterministic_record, micro_heuristic};
use super::schema::schema_for_prompt;
use super::types::{GameContext, PlateAppearanceCanonical, PlateAppearanceDraft};
use super::validator::validate_value;
use crate::config::{PipelineConfig, StageMode};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{complete_with_timeout, extract_json_object, CompletionRequest, LLMProvider};

const SYSTEM_PROMPT: &str =
    "You are a strict JSON emitter. Output ONLY a JSON object matching the provided schema. No prose.";
const SELF_CHECK_SYSTEM_PROMPT: &str =
    "You are a strict JSON emitter. Output only JSON matching the schema.";

/// Where a segment is in its canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonState {
    Pending,
    /// A reply from attempt `attempt` awaiting validation
    Validating { attempt: usize, candidate: Value },
    /// About to issue attempt `n` with the previous errors appended
    Retrying(usize),
    SelfChecking,
    Succeeded(PlateAppearanceCanonical),
    Failed(Vec<String>),
}

impl CanonState {
    pub fn name(&self) -> &'static str {
        match self {
            CanonState::Pending => "pending",
            CanonState::Validating { .. } => "validating",
            CanonState::Retrying(_) => "retrying",
            CanonState::SelfChecking => "self_checking",
            CanonState::Succeeded(_) => "succeeded",
            CanonState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CanonState::Succeeded(_) | CanonState::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CanonicalizerOptions {
    pub model: String,
    pub mode: StageMode,
    /// Model attempts before the self-check
    pub max_retries: usize,
    pub self_check: bool,
    pub timeout: Duration,
}

impl Default for CanonicalizerOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CanonicalizerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            model: config.model.clone(),
            mode: config.canonicalization,
            max_retries: config.canon_retries.max(1),
            self_check: config.self_check,
            timeout: config.timeout(),
        }
    }
}

/// Canonicalizes segments against one provider and one shared cache.
#[derive(Clone)]
pub struct Canonicalizer {
    provider: Option<Arc<dyn LLMProvider>>,
    cache: CanonCache,
    options: CanonicalizerOptions,
}

impl Canonicalizer {
    pub fn new(cache: CanonCache, options: CanonicalizerOptions) -> Self {
        Self {
            provider: None,
            cache,
            options,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn options(&self) -> &CanonicalizerOptions {
        &self.options
    }

    pub fn cache(&self) -> &CanonCache {
        &self.cache
    }

    /// One validated record for `segment`, from cache when the same content
    /// was already canonicalized under the same model and mode.
    pub async fn canonicalize(
        &self,
        segment: &str,
        ctx: &GameContext,
        cancel: &CancellationToken,
    ) -> PipelineResult<PlateAppearanceCanonical> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let key = cache_key(segment, ctx, &self.options.model, self.options.mode.as_str());
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Canon cache hit {}", &key[..12]);
            return Ok(hit);
        }

        let record = match self.options.mode {
            StageMode::Deterministic => deterministic_record(segment)?,
            StageMode::Model => self.run_model(segment, ctx, cancel).await?,
        };

        self.cache.set(&key, record.clone()).await;
        Ok(record)
    }

    async fn run_model(
        &self,
        segment: &str,
        ctx: &GameContext,
        cancel: &CancellationToken,
    ) -> PipelineResult<PlateAppearanceCanonical> {
        let provider = self.provider.as_deref().ok_or_else(|| {
            PipelineError::Input("model canonicalization requested without a provider".into())
        })?;

        let context_json = serde_json::to_string_pretty(ctx)
            .map_err(|e| PipelineError::Input(format!("game context is not serializable: {}", e)))?;
        let base_prompt = build_prompt(segment, &context_json);
        let heuristic = micro_heuristic(segment);

        let mut last_errors: Vec<String> = Vec::new();
        let mut last_candidate: Option<Value> = None;
        let mut state = CanonState::Pending;

        while !state.is_terminal() {
            debug!("canonicalize state: {}", state.name());
            state = match state {
                CanonState::Pending => {
                    self.attempt(provider, &base_prompt, 0, &heuristic, &mut last_errors, cancel)
                        .await?
                }
                CanonState::Retrying(n) => {
                    let prompt = format!(
                        "{}\n\nErrors last attempt: {}\nRe-emit JSON only.",
                        base_prompt,
                        serde_json::to_string(&last_errors).unwrap_or_default()
                    );
                    self.attempt(provider, &prompt, n, &heuristic, &mut last_errors, cancel)
                        .await?
                }
                CanonState::Validating { attempt, candidate } => match validate_value(&candidate) {
                    Ok(record) => CanonState::Succeeded(record),
                    Err(errors) => {
                        warn!(
                            "Attempt {}/{} failed validation: {}",
                            attempt + 1,
                            self.options.max_retries,
                            errors.join("; ")
                        );
                        last_errors = errors;
                        last_candidate = Some(candidate);
                        self.after_failure(attempt, &last_errors)
                    }
                },
                CanonState::SelfChecking => {
                    self.self_check(
                        provider,
                        segment,
                        &context_json,
                        last_candidate.as_ref(),
                        &mut last_errors,
                        cancel,
                    )
                    .await?
                }
                terminal => terminal,
            };
        }

        match state {
            CanonState::Succeeded(record) => Ok(record),
            CanonState::Failed(errors) => Err(PipelineError::Validation(errors)),
            other => Err(PipelineError::Validation(vec![format!(
                "canonicalization stopped in state {}",
                other.name()
            )])),
        }
    }

    fn after_failure(&self, attempt: usize, errors: &[String]) -> CanonState {
        if attempt + 1 < self.options.max_retries {
            CanonState::Retrying(attempt + 1)
        } else if self.options.self_check {
            CanonState::SelfChecking
        } else {
            CanonState::Failed(errors.to_vec())
        }
    }

    /// One model call. Transport and parse failures become the next state
    /// directly; a parsed reply goes to validation with heuristic gaps filled.
    async fn attempt(
        &self,
        provider: &dyn LLMProvider,
        prompt: &str,
        attempt: usize,
        heuristic: &PlateAppearanceDraft,
        last_errors: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> PipelineResult<CanonState> {
        info!(
            "Canonicalize attempt {}/{} using {}",
            attempt + 1,
            self.options.max_retries,
            self.options.model
        );
        let request = CompletionRequest::new(&self.options.model, prompt, self.options.timeout)
            .with_system(SYSTEM_PROMPT);

        let reply = complete_with_timeout(provider, &request, cancel)
            .await
            .and_then(|text| extract_json_object(&text));

        match reply {
            Ok(parsed) => Ok(CanonState::Validating {
                attempt,
                candidate: heuristic.fill_gaps(parsed),
            }),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt + 1, self.options.max_retries, e);
                *last_errors = e.messages();
                Ok(self.after_failure(attempt, &last_errors[..]))
            }
        }
    }

    /// Final corrective request. Its reply is validated as returned, without
    /// the heuristic merge.
    async fn self_check(
        &self,
        provider: &dyn LLMProvider,
        segment: &str,
        context_json: &str,
        last_candidate: Option<&Value>,
        last_errors: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> PipelineResult<CanonState> {
        info!("Canonicalize self-check using {}", self.options.model);
        let existing = last_candidate
            .map(Value::to_string)
            .unwrap_or_else(|| "null".to_string());
        let prompt = format!(
            "You will correct a JSON record to align with the raw plate appearance text and the schema. Output JSON ONLY.\n\nSchema:\n{}\n\nContext:\n{}\n\nRaw Text:\n{}\n\nExisting JSON (may contain errors):\n{}",
            schema_for_prompt(),
            context_json,
            segment,
            existing
        );
        let request = CompletionRequest::new(&self.options.model, prompt, self.options.timeout)
            .with_system(SELF_CHECK_SYSTEM_PROMPT);

        let reply = complete_with_timeout(provider, &request, cancel)
            .await
            .and_then(|text| extract_json_object(&text));

        Ok(match reply {
            Ok(parsed) => match validate_value(&parsed) {
                Ok(record) => CanonState::Succeeded(record),
                Err(errors) => CanonState::Failed(errors),
            },
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                if last_errors.is_empty() {
                    *last_errors = e.messages();
                }
                CanonState::Failed(std::mem::take(last_errors))
            }
        })
    }
}

fn build_prompt(segment: &str, context_json: &str) -> String {
    format!(
        "You will canonicalize a youth baseball plate appearance into a strict JSON record.

Rules:
- Output JSON ONLY, no prose, matching the provided JSON Schema exactly.
- Do not infer base advances except explicit phrases (steal/advance/score). Forced advances are handled elsewhere.
- If uncertain, set confidence conservatively and leave optional fields null/omitted.
- Use short initials for names if present in the text.

JSON Schema (DRAFT-07):
{}

Context:
{}

Raw Plate Appearance Text:
{}
",
        schema_for_prompt(),
        context_json,
        segment
    )
}

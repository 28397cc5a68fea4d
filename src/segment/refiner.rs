//! Segment Refiner
//!
//! Improves the deterministic split with model calls over small chunks of
//! the baseline. Chunks run on the worker pool and are reassembled by index;
//! any chunk the model cannot handle keeps its deterministic segments.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::patterns::{
    describes_same_play, has_outcome_keyword, holds_narrative, is_summary_led, split_sentences,
};
use super::segmenter::deterministic_segment;
use crate::config::{PipelineConfig, SegmentationMode};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{complete_with_timeout, extract_json_array, CompletionRequest, LLMProvider};
use crate::orchestrator::pool::WorkerPool;

const SYSTEM_PROMPT: &str = "You are a strict JSON array emitter. Output only valid JSON.";

/// A baseline this short over a long raw text is chunked on the raw text.
const TINY_BASELINE: usize = 5;

#[derive(Debug, Clone)]
pub struct RefinerOptions {
    pub model: String,
    pub mode: SegmentationMode,
    pub max_retries: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_chunk_chars: usize,
    pub max_chunk_pas: usize,
}

impl Default for RefinerOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RefinerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            model: config.model.clone(),
            mode: config.segmentation,
            max_retries: config.segmentation_retries.max(1),
            concurrency: config.segmentation_concurrency.max(1),
            timeout: config.timeout(),
            max_chunk_chars: config.max_chunk_chars.max(1),
            max_chunk_pas: config.max_chunk_pas.max(1),
        }
    }
}

#[derive(Clone)]
pub struct SegmentRefiner {
    provider: Option<Arc<dyn LLMProvider>>,
    options: RefinerOptions,
}

impl SegmentRefiner {
    pub fn new(options: RefinerOptions) -> Self {
        Self {
            provider: None,
            options,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn options(&self) -> &RefinerOptions {
        &self.options
    }

    /// Ordered plate appearance segments for a whole game log.
    pub async fn segment(&self, raw: &str, cancel: &CancellationToken) -> PipelineResult<Vec<String>> {
        let baseline = deterministic_segment(raw);
        info!(
            "Deterministic segmentation produced {} segments ({} mode)",
            baseline.len(),
            self.options.mode.as_str()
        );

        // The baseline is final as produced; only model output is re-joined.
        let refined = match self.options.mode {
            SegmentationMode::Deterministic => return Ok(baseline),
            SegmentationMode::Model => self.refine(raw, &baseline, cancel).await?,
            SegmentationMode::Hybrid => match self.refine(raw, &baseline, cancel).await {
                Ok(refined) if refined.len() >= baseline.len() => refined,
                Ok(refined) => {
                    info!(
                        "Model split {} segments below baseline {}, keeping baseline",
                        refined.len(),
                        baseline.len()
                    );
                    return Ok(baseline);
                }
                Err(e @ (PipelineError::Cancelled | PipelineError::Input(_))) => return Err(e),
                Err(e) => {
                    warn!("Model segmentation failed, keeping baseline: {}", e);
                    return Ok(baseline);
                }
            },
        };

        Ok(post_merge(refined))
    }

    async fn refine(
        &self,
        raw: &str,
        baseline: &[String],
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<String>> {
        let provider = self.provider.as_deref().ok_or_else(|| {
            PipelineError::Input("model segmentation requested without a provider".into())
        })?;
        let pool = WorkerPool::new(self.options.concurrency);
        let groups = chunk_baseline(baseline, self.options.max_chunk_chars, self.options.max_chunk_pas);

        if groups.len() <= 1 {
            if baseline.len() <= TINY_BASELINE && raw.len() > self.options.max_chunk_chars {
                let raw_chunks = chunk_raw_text(raw, self.options.max_chunk_chars);
                if raw_chunks.len() > 1 {
                    let total = raw_chunks.len();
                    info!("Baseline is tiny, splitting {} raw text chunks", total);
                    let results = pool
                        .run(&raw_chunks, cancel, |i, chunk| async move {
                            debug!("Raw chunk {}/{}", i + 1, total);
                            match self.call_chunk(provider, chunk, 0, cancel).await {
                                Ok(segs) => segs,
                                Err(e) => {
                                    warn!("Raw chunk {} fell back to deterministic split: {}", i + 1, e);
                                    deterministic_segment(chunk)
                                }
                            }
                        })
                        .await;
                    return collect_chunks(results, cancel);
                }
            }

            return match self.call_chunk(provider, raw, baseline.len(), cancel).await {
                Ok(segs) => Ok(segs),
                Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
                Err(e) => {
                    warn!("Single-chunk segmentation fell back to baseline: {}", e);
                    Ok(baseline.to_vec())
                }
            };
        }

        let total = groups.len();
        let results = pool
            .run(&groups, cancel, |i, group| async move {
                debug!(
                    "Processing chunk {}/{} with {} baseline segments",
                    i + 1,
                    total,
                    group.len()
                );
                let text = group.join(" \n");
                match self.call_chunk(provider, &text, group.len(), cancel).await {
                    Ok(segs) => segs,
                    Err(e) => {
                        warn!("Chunk {} kept its baseline: {}", i + 1, e);
                        group.clone()
                    }
                }
            })
            .await;
        collect_chunks(results, cancel)
    }

    /// One chunk under the retry budget. An empty array counts as a failure.
    async fn call_chunk(
        &self,
        provider: &dyn LLMProvider,
        text: &str,
        baseline_count: usize,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<String>> {
        let prompt = chunk_prompt(text, baseline_count);
        let mut last_error = PipelineError::MalformedReply("no attempt made".into());

        for attempt in 0..self.options.max_retries.max(1) {
            let user_prompt = if attempt == 0 {
                prompt.clone()
            } else {
                format!("{}\n\nLast error: {}. Return JSON array only.", prompt, last_error)
            };
            debug!(
                "Segmentation attempt {}/{} using {}",
                attempt + 1,
                self.options.max_retries,
                self.options.model
            );

            let request = CompletionRequest::new(&self.options.model, user_prompt, self.options.timeout)
                .with_system(SYSTEM_PROMPT);
            let reply = complete_with_timeout(provider, &request, cancel)
                .await
                .and_then(|text| extract_json_array(&text))
                .and_then(segments_from_reply);

            match reply {
                Ok(segs) => return Ok(segs),
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

fn segments_from_reply(items: Vec<Value>) -> PipelineResult<Vec<String>> {
    let segs: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string().trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect();
    let total = segs.len();
    let segs: Vec<String> = segs.into_iter().filter(|s| has_outcome_keyword(s)).collect();
    if segs.len() < total {
        debug!("Dropped {} model segments without an outcome", total - segs.len());
    }
    if segs.is_empty() {
        return Err(PipelineError::MalformedReply("No segments returned".into()));
    }
    Ok(segs)
}

fn collect_chunks(
    results: Vec<Option<Vec<String>>>,
    cancel: &CancellationToken,
) -> PipelineResult<Vec<String>> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(results.into_iter().flatten().flatten().collect())
}

/// Group baseline segments so that no chunk exceeds either budget. Each
/// segment is charged its length plus two for the separator.
pub fn chunk_baseline(baseline: &[String], max_chars: usize, max_pas: usize) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for seg in baseline {
        let add = seg.len() + 2;
        if current.len() >= max_pas || current_len + add > max_chars {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            current_len = 0;
        }
        current.push(seg.clone());
        current_len += add;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Sentence-packed chunks of the raw text, for when the baseline is too
/// small to chunk on.
pub fn chunk_raw_text(raw: &str, max_chars: usize) -> Vec<String> {
    let flattened = raw
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('|', ". ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    for sentence in split_sentences(&flattened) {
        let add_len = sentence.len() + usize::from(!buffer.is_empty());
        if !buffer.is_empty() && buffer.len() + add_len > max_chars {
            chunks.push(std::mem::replace(&mut buffer, sentence));
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(&sentence);
        }
    }
    if !buffer.is_empty() {
        chunks.push(buffer);
    }
    chunks
}

fn chunk_prompt(text: &str, baseline_count: usize) -> String {
    let base = build_segmentation_prompt(text);
    if baseline_count > 0 {
        format!(
            "{}\n\nThe deterministic baseline for this CHUNK produced {} segments. Improve upon it if needed. Only return segments from THIS chunk; do not include anything outside it.",
            base, baseline_count
        )
    } else {
        format!(
            "{}\n\nOnly return segments from THIS chunk; do not include anything outside it.",
            base
        )
    }
}

pub fn build_segmentation_prompt(text: &str) -> String {
    format!(
        "Task: Split the following youth baseball game log text into individual plate appearances (PAs).
Rules:
- Output a JSON array of strings ONLY. No prose. Each string is exactly one PA's raw text.
- Join 'In play.' with the immediately following descriptive sentence(s) that describe the ball-in-play result.
- Exclude scoreboard lines, inning headers, and team scores (e.g., 'Top 5th - ...', 'BRDG 8 - FRNT 2').
- Include pitcher/batter identification when attached to the PA (e.g., 'J M strikes out swinging, H W pitching.').
- Exclude substitutions unless they affect the next PA's pitcher (keep 'X in at pitcher' attached to the FIRST subsequent PA).
- Preserve pitch sequences and explicit base runner actions in the same PA chunk.
- Do not summarize or normalize; just split.

Text to split:

{}",
        text
    )
}

/// Re-join adjacent (summary-led, name-led) pairs that describe the same
/// play. Applied to model output only; a summary that already holds its
/// narrative absorbs nothing more.
pub fn post_merge(segments: Vec<String>) -> Vec<String> {
    let mut merged = Vec::with_capacity(segments.len());
    let mut iter = segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .peekable();

    while let Some(current) = iter.next() {
        let joins = is_summary_led(&current)
            && !holds_narrative(&current)
            && iter.peek().is_some_and(|next| describes_same_play(&current, next));
        if joins {
            if let Some(next) = iter.next() {
                merged.push(format!("{} {}", current, next));
                continue;
            }
        }
        merged.push(current);
    }
    merged
}

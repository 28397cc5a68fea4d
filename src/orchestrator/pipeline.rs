//! Extraction Pipeline
//!
//! Wires the stages together: segmentation, canonicalization on the worker
//! pool, name backfill, alias resolution, aggregation and recommendations.
//! One pipeline owns one canon cache, shared by every run it performs.

use std::num::NonZeroU32;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pool::WorkerPool;
use super::report::{CardsReport, ExtractionReport, RunMeta, RunReport};
use crate::canon::{CanonCache, Canonicalizer, CanonicalizerOptions, GameContext, PlateAppearanceCanonical};
use crate::cards::{aggregate_cards, Recommender, RecommenderOptions};
use crate::config::{PipelineConfig, SegmentationMode};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{LLMProvider, RateLimitedProvider};
use crate::names::{apply_aliases, backfill_identities, build_alias_map};
use crate::segment::{RefinerOptions, SegmentRefiner};

/// Batter positions listed in a strict-mode failure.
const MISSING_BATTER_PREVIEW: usize = 10;

pub struct ExtractionPipeline {
    config: PipelineConfig,
    provider: Option<Arc<dyn LLMProvider>>,
    cache: CanonCache,
}

impl ExtractionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.normalized();
        Self {
            cache: CanonCache::new(config.cache_capacity),
            provider: None,
            config,
        }
    }

    /// Attach the completion provider, behind a client-side rate limit when
    /// one is configured.
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        let provider = match self.config.requests_per_minute.and_then(NonZeroU32::new) {
            Some(per_minute) => {
                info!("Rate limiting model calls to {} per minute", per_minute);
                Arc::new(RateLimitedProvider::new(provider, per_minute)) as Arc<dyn LLMProvider>
            }
            None => provider,
        };
        self.provider = Some(provider);
        self
    }

    /// Share an existing cache, e.g. across pipelines in one process.
    pub fn with_cache(mut self, cache: CanonCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CanonCache {
        &self.cache
    }

    fn refiner(&self) -> SegmentRefiner {
        let refiner = SegmentRefiner::new(RefinerOptions::from(&self.config));
        match &self.provider {
            Some(p) => refiner.with_provider(p.clone()),
            None => refiner,
        }
    }

    fn canonicalizer(&self) -> Canonicalizer {
        let canonicalizer =
            Canonicalizer::new(self.cache.clone(), CanonicalizerOptions::from(&self.config));
        match &self.provider {
            Some(p) => canonicalizer.with_provider(p.clone()),
            None => canonicalizer,
        }
    }

    fn recommender(&self) -> Recommender {
        let recommender = Recommender::new(RecommenderOptions::from(&self.config));
        match &self.provider {
            Some(p) => recommender.with_provider(p.clone()),
            None => recommender,
        }
    }

    fn require_provider(&self, needed: bool, stage: &str) -> PipelineResult<()> {
        if needed && self.provider.is_none() {
            return Err(PipelineError::Input(format!(
                "{} is configured to use a model but no provider is attached",
                stage
            )));
        }
        Ok(())
    }

    /// Raw game text to aligned segments and canonical records. Units that
    /// fail are dropped from both lists and reported as `Segment i: ...`.
    pub async fn extract(
        &self,
        raw: &str,
        ctx: &GameContext,
        cancel: &CancellationToken,
    ) -> PipelineResult<ExtractionReport> {
        if raw.trim().is_empty() {
            return Err(PipelineError::Input("game text is empty".into()));
        }
        ctx.validate()?;
        self.require_provider(
            self.config.segmentation != SegmentationMode::Deterministic,
            "segmentation",
        )?;
        self.require_provider(
            !self.config.canonicalization.is_deterministic(),
            "canonicalization",
        )?;

        let segments = self.refiner().segment(raw, cancel).await?;
        info!("Canonicalizing {} segments", segments.len());

        let canonicalizer = self.canonicalizer();
        let canonicalizer = &canonicalizer;
        let pool = WorkerPool::new(self.config.canon_concurrency);
        let outcomes = pool
            .run(&segments, cancel, |i, segment| async move {
                let outcome = canonicalizer.canonicalize(segment, ctx, cancel).await;
                if let Err(ref e) = outcome {
                    warn!("Segment {} failed: {}", i, e);
                }
                outcome
            })
            .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut errors = Vec::new();
        let mut slots: Vec<Option<PlateAppearanceCanonical>> = Vec::with_capacity(segments.len());
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(record)) => slots.push(Some(record)),
                Some(Err(PipelineError::Cancelled)) | None => return Err(PipelineError::Cancelled),
                Some(Err(e)) => {
                    errors.push(format!("Segment {}: {}", i, e.messages().join("; ")));
                    slots.push(None);
                }
            }
        }

        backfill_identities(&mut slots, &segments, ctx.pitcher.as_deref());

        let (segments, data): (Vec<String>, Vec<PlateAppearanceCanonical>) = segments
            .into_iter()
            .zip(slots)
            .filter_map(|(segment, slot)| slot.map(|record| (segment, record)))
            .unzip();

        Ok(ExtractionReport {
            ok: errors.is_empty(),
            data,
            segments,
            errors,
        })
    }

    /// Resolve batter aliases, aggregate hitter cards and attach both
    /// recommendation tracks.
    pub async fn build_cards(
        &self,
        records: &[PlateAppearanceCanonical],
        cancel: &CancellationToken,
    ) -> PipelineResult<CardsReport> {
        self.require_provider(!self.config.recommendation.is_deterministic(), "recommendation")?;
        let strict = self.config.strict_aliases;

        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, pa)| pa.batter.as_deref().map_or(true, |b| b.trim().is_empty()))
            .map(|(i, _)| i)
            .collect();
        if strict && !missing.is_empty() {
            let preview: Vec<String> = missing
                .iter()
                .take(MISSING_BATTER_PREVIEW)
                .map(|i| format!("#{}", i))
                .collect();
            let more = if missing.len() > MISSING_BATTER_PREVIEW { ", ..." } else { "" };
            return Ok(CardsReport::failed(vec![format!(
                "[strict] Missing batter on {} plate appearances (first: {}{})",
                missing.len(),
                preview.join(", "),
                more
            )]));
        }

        let resolution = build_alias_map(
            records.iter().filter_map(|pa| pa.batter.as_deref()),
            &self.config.aliases,
        );
        if strict {
            if let Err(e) = resolution.require_resolved() {
                let lines = e.messages();
                warn!("Strict alias resolution failed with {} problems", lines.len());
                return Ok(CardsReport::failed(lines));
            }
        }
        let problems = resolution.problems();
        for problem in &problems {
            warn!("{}", problem);
        }

        let mut normalized = records.to_vec();
        apply_aliases(&mut normalized, &resolution);
        let mut cards = aggregate_cards(&normalized);
        info!("Aggregated {} hitter cards", cards.len());

        let mut errors = problems;
        errors.extend(self.recommender().recommend(&mut cards, cancel).await?);

        Ok(CardsReport {
            ok: true,
            cards,
            errors,
        })
    }

    /// Extraction followed by cards, folded into one report.
    pub async fn run(
        &self,
        raw: &str,
        ctx: &GameContext,
        cancel: &CancellationToken,
    ) -> PipelineResult<RunReport> {
        self.require_provider(!self.config.recommendation.is_deterministic(), "recommendation")?;
        let extraction = self.extract(raw, ctx, cancel).await?;
        let cards = self.build_cards(&extraction.data, cancel).await?;

        let mut meta = RunMeta::new(&self.config, raw, extraction.data.len());
        meta.extraction_errors = extraction.errors;
        meta.recommendation_errors = cards.errors;

        Ok(RunReport {
            ok: extraction.ok && cards.ok,
            meta,
            hitters: cards.cards,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::PaResult;
    use crate::config::StageMode;
    use crate::llm::mock::ScriptedProvider;

    const LOG: &str = "L D strikes out swinging, J N pitching.\nG B walks, J N pitching.\nIn play. flies out to center fielder.";

    fn deterministic() -> ExtractionPipeline {
        ExtractionPipeline::new(PipelineConfig::deterministic())
    }

    #[tokio::test]
    async fn test_deterministic_extraction_is_aligned() {
        let report = deterministic()
            .extract(LOG, &GameContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.data.len(), report.segments.len());
        assert_eq!(report.data[0].pa_result, PaResult::Strikeout);
        assert_eq!(report.data[0].batter.as_deref(), Some("L D"));
        assert_eq!(report.data[2].pa_result, PaResult::Fb);
        assert_eq!(report.data[2].fielder_num, Some(8));
        // neighbour supplies the pitcher
        assert_eq!(report.data[2].pitcher.as_deref(), Some("J N"));
    }

    #[tokio::test]
    async fn test_input_errors_fail_fast() {
        let pipeline = deterministic();
        let cancel = CancellationToken::new();
        assert!(matches!(
            pipeline.extract("   ", &GameContext::default(), &cancel).await,
            Err(PipelineError::Input(_))
        ));
        let bad_ctx = GameContext {
            outs: 3,
            ..GameContext::default()
        };
        assert!(matches!(
            pipeline.extract(LOG, &bad_ctx, &cancel).await,
            Err(PipelineError::Input(_))
        ));
        let model_config = ExtractionPipeline::new(PipelineConfig::default());
        assert!(matches!(
            model_config.extract(LOG, &GameContext::default(), &cancel).await,
            Err(PipelineError::Input(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_unit_is_dropped_and_reported() {
        let config = PipelineConfig {
            segmentation: SegmentationMode::Deterministic,
            canonicalization: StageMode::Model,
            canon_retries: 1,
            canon_concurrency: 1,
            self_check: false,
            ..PipelineConfig::default()
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"pa_result":"strikeout","pitches":[],"outs_added":1,"explicit_runner_actions":[],"notes":[],"confidence":0.9}"#),
            Ok(r#"{"pa_result":"walk","pitches":[],"outs_added":1,"explicit_runner_actions":[],"notes":[],"confidence":0.9}"#),
            Ok(r#"{"pa_result":"fb","pitches":["in_play"],"outs_added":1,"explicit_runner_actions":[],"notes":[],"confidence":0.9}"#),
        ]));
        let report = ExtractionPipeline::new(config)
            .with_provider(provider)
            .extract(LOG, &GameContext::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!report.ok);
        assert_eq!(report.data.len(), 2);
        assert_eq!(report.segments.len(), 2);
        assert!(report.segments[1].starts_with("In play."));
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Segment 1: "));
    }

    #[tokio::test]
    async fn test_strict_missing_batter() {
        let pipeline = deterministic();
        let cancel = CancellationToken::new();
        let extraction = pipeline
            .extract("In play. flies out to center fielder.", &GameContext::default(), &cancel)
            .await
            .unwrap();
        let cards = pipeline.build_cards(&extraction.data, &cancel).await.unwrap();
        assert!(!cards.ok);
        assert!(cards.cards.is_empty());
        assert_eq!(
            cards.errors,
            vec!["[strict] Missing batter on 1 plate appearances (first: #0)"]
        );
    }

    fn lenient() -> ExtractionPipeline {
        ExtractionPipeline::new(PipelineConfig {
            strict_aliases: false,
            ..PipelineConfig::deterministic()
        })
    }

    #[tokio::test]
    async fn test_run_report_is_reproducible() {
        let cancel = CancellationToken::new();
        let first = lenient().run(LOG, &GameContext::default(), &cancel).await.unwrap();
        let second = lenient().run(LOG, &GameContext::default(), &cancel).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(first.meta.generated_at.starts_with("deterministic:"));
        assert_eq!(first.meta.pa_total, 3);
        assert_eq!(first.hitters.len(), 3);
    }

    #[tokio::test]
    async fn test_strict_by_default_fails_on_missing_batter() {
        let cancel = CancellationToken::new();
        let report = deterministic().run(LOG, &GameContext::default(), &cancel).await.unwrap();
        assert!(!report.ok);
        assert!(report.hitters.is_empty());
        assert_eq!(report.meta.pa_total, 3);
        assert!(report.meta.recommendation_errors[0].starts_with("[strict] Missing batter on 1"));
    }

    #[tokio::test]
    async fn test_strict_ambiguity_lists_candidates() {
        let mut john = crate::canon::minimal_from_text("John Miller walks");
        john.batter = Some("John Miller".into());
        let mut jane = crate::canon::minimal_from_text("Jane Miller walks");
        jane.batter = Some("Jane Miller".into());
        let mut short = crate::canon::minimal_from_text("Miller walks");
        short.batter = Some("Miller".into());

        let cards = deterministic()
            .build_cards(&[john, jane, short], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!cards.ok);
        assert!(cards.cards.is_empty());
        assert_eq!(
            cards.errors,
            vec![
                "[alias] Ambiguous last name 'Miller': Jane Miller, John Miller",
                "[alias] Unresolved names: Miller",
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = deterministic()
            .extract(LOG, &GameContext::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}

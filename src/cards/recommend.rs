//! Recommendation Engine
//!
//! Two tracks per card. The deterministic track maps threshold rules to
//! canned coaching and scouting text. The model track asks for both lists,
//! filters and backfills them from the deterministic track, and scales the
//! claimed confidence by sample size.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregate::{HitterCard, Recommendations};
use crate::canon::PitchEvent;
use crate::config::{PipelineConfig, StageMode};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{complete_with_timeout, extract_json_object, CompletionRequest, LLMProvider};
use crate::orchestrator::pool::WorkerPool;

pub const MIN_ITEMS: usize = 3;
pub const MAX_MODEL_ITEMS: usize = 6;
const MAX_RULE_ITEMS: usize = 5;

const DEVELOPMENT_FALLBACK: &str =
    "Reinforce timing: load earlier; be on time for fastball, adjust to off-speed.";
const EXPLOIT_FALLBACK: &str = "Standard plan: get ahead, change eye level, finish off the plate.";

const SYSTEM_PROMPT: &str = "Output only JSON. No prose.";

lazy_static::lazy_static! {
    static ref BANNED: Vec<Regex> = [
        r"increase\s+plate\s+appearances",
        r"more\s+plate\s+appearances",
        r"needs?\s+more\s+data",
        r"larger\s+sample",
        r"increase\s+pitches",
        r"see\s+more\s+pitches",
        r"get\s+more\s+at-?bats",
        r"play\s+more\s+games",
        r"collect\s+more\s+data",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect();

    static ref BASERUNNING_MISTAKE: Regex =
        Regex::new(r"(?i)out at|picked off|caught stealing").unwrap();
}

/// One track as the model returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TrackReply {
    /// Specific, controllable items grounded in the summary
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// 0..1
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Reply shape for the model track. A bare top-level `recommendations`
/// list is still accepted as the development track.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationReply {
    #[serde(default)]
    pub development: Option<TrackReply>,
    #[serde(default)]
    pub exploit: Option<TrackReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Confidence of the deterministic tracks: 0.45 rising to 0.85 with PAs.
pub fn deterministic_confidence(pas: usize) -> f64 {
    round2(0.45 + (0.2 * pas as f64 / 8.0).clamp(0.0, 0.4))
}

/// 0.5 for no PAs, rising linearly to 1.0 at six.
pub fn sample_size_scale(pas: usize) -> f64 {
    (0.5 + 0.5 * (pas as f64 / 6.0).min(1.0)).min(1.0)
}

/// Clamp a model-claimed confidence to 0..1 and scale it by sample size.
pub fn sample_aware_confidence(claimed: Option<f64>, pas: usize) -> Option<f64> {
    let c = claimed.filter(|c| c.is_finite())?.clamp(0.0, 1.0);
    Some(round2(c * sample_size_scale(pas)))
}

pub fn is_uncontrollable(item: &str) -> bool {
    BANNED.iter().any(|re| re.is_match(item))
}

/// Drop banned and duplicate items, keep at most `max`, then top up to
/// `min` from `fallback` under the same filters.
pub fn cap_fill_unique(items: &[String], min: usize, max: usize, fallback: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for item in items.iter().filter(|s| !is_uncontrollable(s)) {
        if out.len() >= max {
            break;
        }
        let t = item.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    for item in fallback.iter().filter(|s| !is_uncontrollable(s)) {
        if out.len() >= min {
            break;
        }
        let t = item.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}

fn finish_rules(mut recs: Vec<&'static str>, filler: &'static str, pas: usize) -> Recommendations {
    let mut seen = HashSet::new();
    recs.retain(|r| seen.insert(*r));
    recs.truncate(MAX_RULE_ITEMS);
    while recs.len() < MIN_ITEMS {
        recs.push(filler);
    }
    Recommendations {
        recommendations: recs.into_iter().map(str::to_string).collect(),
        confidence: deterministic_confidence(pas),
    }
}

/// What this hitter should work on.
pub fn deterministic_development(card: &HitterCard) -> Recommendations {
    let t = &card.totals;
    let b = &card.breakdown;
    let bb = &b.batted_ball;
    let mut recs = Vec::new();

    if t.strikeout_rate >= 0.35 || t.contact_rate <= 0.45 {
        recs.push("Simplify two-strike approach: shorten stride, choke up, prioritize contact to middle/oppo.");
        recs.push("Start load earlier to avoid being late; focus on on-time heel plant before swing.");
    }
    if t.walk_rate <= 0.05 && b.pitch_count(PitchEvent::Ball) < b.pitch_count(PitchEvent::CalledStrike) {
        recs.push("Tighten swing decisions: hunt one zone early; take borderline pitches until two strikes.");
        recs.push("Improve takes: track pitches to the glove; call ball/strike aloud in the on-deck circle.");
    }
    if bb.gb >= bb.fb.max(bb.ld) + 2 {
        recs.push("Reduce rollovers: keep hands above the ball; feel slight uphill through contact, not down to.");
    }
    if bb.fb >= bb.gb + 2 && b.power.hr + b.power.double <= 1 {
        recs.push("Add intent: drive through center; finish high with full rotation instead of slicing under.");
    }
    if b.power.extra_base_hits() == 0 && t.pas >= 6 {
        recs.push("Add rotational speed: med-ball scoop toss and step-behind throws 2x/week.");
    }
    if card.sample_notes.iter().any(|n| BASERUNNING_MISTAKE.is_match(n)) {
        recs.push("Sharpen baserunning reads: freeze on line drives; bigger secondary with eyes on the pitcher.");
    }

    finish_rules(recs, DEVELOPMENT_FALLBACK, t.pas)
}

/// How an opponent should pitch and defend this hitter.
pub fn deterministic_exploit(card: &HitterCard) -> Recommendations {
    let t = &card.totals;
    let b = &card.breakdown;
    let bb = &b.batted_ball;
    let mut recs = Vec::new();

    if t.strikeout_rate >= 0.35 {
        recs.push("Attack up and out of the zone with two strikes; expand late with breakers off the plate.");
        recs.push("Get ahead early; elevate fastball above the belt then finish with slider away.");
    }
    if t.contact_rate <= 0.45 {
        recs.push("Pound edge zones; avoid middle. Force chase by tunneling off-speed after first-pitch strike.");
    }
    if t.walk_rate <= 0.05 {
        recs.push("Avoid free passes: expand early. He will chase; do not give middle-middle strikes.");
    } else if t.walk_rate >= 0.15 {
        recs.push("Challenge in-zone early; limit waste pitches. Make him earn swings in the zone.");
    }
    if bb.gb >= bb.fb.max(bb.ld) + 2 && b.power.extra_base_hits() == 0 {
        recs.push("Live down in the zone; induce rollovers to SS/2B. Infield plays a step in for the double play.");
    }
    if bb.fb >= bb.gb + 2 && b.power.hr + b.power.double <= 1 {
        recs.push("Climb the ladder: ride fastballs at the letters; outfield shades shallow corners for weak flies.");
    }
    let balls = b.pitch_count(PitchEvent::Ball) as f64;
    let called = b.pitch_count(PitchEvent::CalledStrike) as f64;
    if balls > called * 1.5 && t.walk_rate >= 0.12 {
        recs.push("Fill the zone early; avoid nibbling. First-pitch strike is key.");
    }

    finish_rules(recs, EXPLOIT_FALLBACK, t.pas)
}

/// Fill both tracks from the rules.
pub fn apply_deterministic(card: &mut HitterCard) {
    card.development = Some(deterministic_development(card));
    card.exploit = Some(deterministic_exploit(card));
}

fn model_track(
    raw: &[String],
    claimed: Option<f64>,
    rules: Recommendations,
    pas: usize,
) -> Recommendations {
    if raw.is_empty() {
        return rules;
    }
    let head: Vec<String> = raw.iter().take(MAX_MODEL_ITEMS).cloned().collect();
    Recommendations {
        recommendations: cap_fill_unique(&head, MIN_ITEMS, MAX_MODEL_ITEMS, &rules.recommendations),
        confidence: sample_aware_confidence(claimed, pas).unwrap_or(rules.confidence),
    }
}

/// Both tracks from a parsed reply, backfilled from the rules.
pub fn tracks_from_reply(
    card: &HitterCard,
    reply: RecommendationReply,
) -> PipelineResult<(Recommendations, Recommendations)> {
    let pas = card.totals.pas;
    let rules_dev = deterministic_development(card);
    let rules_exp = deterministic_exploit(card);

    if let Some(legacy) = reply.recommendations {
        let development = model_track(&legacy, reply.confidence, rules_dev, pas);
        if legacy.is_empty() || development.recommendations.is_empty() {
            return Err(PipelineError::MalformedReply("no recommendations returned".into()));
        }
        return Ok((development, rules_exp));
    }

    let dev = reply.development.unwrap_or_default();
    let exp = reply.exploit.unwrap_or_default();
    if dev.recommendations.is_empty() && exp.recommendations.is_empty() {
        return Err(PipelineError::MalformedReply("no recommendations returned".into()));
    }
    Ok((
        model_track(&dev.recommendations, dev.confidence, rules_dev, pas),
        model_track(&exp.recommendations, exp.confidence, rules_exp, pas),
    ))
}

fn build_prompt(card: &HitterCard) -> String {
    let summary = json!({
        "hitter": card.hitter,
        "totals": card.totals,
        "breakdown": card.breakdown,
        "sample_notes": card.sample_notes,
    });
    format!(
        r#"You are a youth baseball coach and opposing scout. Based ONLY on the provided summary, return TWO recommendation sets:
Strictly follow:
- Be specific and concise (bulleted items, 3-5 each).
- Base every item ONLY on the provided stats/notes; do not guess beyond them.
- Never recommend uncontrollable/meta actions (e.g., "increase plate appearances", "get more data", "see more pitches", "play more games").
- Do not mention sample size or data limitations. If sample is small, reflect uncertainty ONLY via lower confidence.
- Output JSON ONLY with this shape:
  {{
    "development": {{ "recommendations": string[], "confidence": number }},
    "exploit": {{ "recommendations": string[], "confidence": number }}
  }}
Meaning:
- development: what THIS hitter should work on to improve.
- exploit: how an opponent should pitch/defend to exploit CURRENT weaknesses.
Summary:
{}"#,
        summary
    )
}

#[derive(Debug, Clone)]
pub struct RecommenderOptions {
    pub model: String,
    pub mode: StageMode,
    pub max_retries: usize,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for RecommenderOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RecommenderOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            model: config.model.clone(),
            mode: config.recommendation,
            max_retries: config.cards_retries.max(1),
            concurrency: config.cards_concurrency.max(1),
            timeout: config.timeout(),
        }
    }
}

#[derive(Clone)]
pub struct Recommender {
    provider: Option<Arc<dyn LLMProvider>>,
    options: RecommenderOptions,
}

impl Recommender {
    pub fn new(options: RecommenderOptions) -> Self {
        Self {
            provider: None,
            options,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attach both tracks to every card. Returns one error line per card
    /// whose model track fell back to the rules.
    pub async fn recommend(
        &self,
        cards: &mut [HitterCard],
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<String>> {
        if self.options.mode.is_deterministic() {
            cards.iter_mut().for_each(apply_deterministic);
            return Ok(Vec::new());
        }
        let provider = self.provider.as_deref().ok_or_else(|| {
            PipelineError::Input("model recommendations requested without a provider".into())
        })?;

        let pool = WorkerPool::new(self.options.concurrency);
        let total = cards.len();
        let results = pool
            .run(&*cards, cancel, |i, card| async move {
                info!("Recommending for {} ({}/{})", card.hitter, i + 1, total);
                self.recommend_one(provider, card, cancel).await
            })
            .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut errors = Vec::new();
        for (card, result) in cards.iter_mut().zip(results) {
            match result {
                Some(Ok((development, exploit))) => {
                    card.development = Some(development);
                    card.exploit = Some(exploit);
                }
                Some(Err(PipelineError::Cancelled)) | None => return Err(PipelineError::Cancelled),
                Some(Err(e)) => {
                    warn!("Recommendations for {} fell back to rules: {}", card.hitter, e);
                    errors.push(format!("{}: {}", card.hitter, e));
                    apply_deterministic(card);
                }
            }
        }
        Ok(errors)
    }

    async fn recommend_one(
        &self,
        provider: &dyn LLMProvider,
        card: &HitterCard,
        cancel: &CancellationToken,
    ) -> PipelineResult<(Recommendations, Recommendations)> {
        let prompt = build_prompt(card);
        let schema = serde_json::to_value(schemars::schema_for!(RecommendationReply))
            .map_err(|e| PipelineError::Input(format!("recommendation schema: {}", e)))?;
        let mut last_error = PipelineError::MalformedReply("no attempt made".into());

        for attempt in 0..self.options.max_retries {
            debug!(
                "Recommendation attempt {}/{} for {}",
                attempt + 1,
                self.options.max_retries,
                card.hitter
            );
            let request = CompletionRequest::new(&self.options.model, prompt.as_str(), self.options.timeout)
                .with_system(SYSTEM_PROMPT)
                .with_schema_hint(schema.clone());

            let outcome = complete_with_timeout(provider, &request, cancel)
                .await
                .and_then(|text| extract_json_object(&text))
                .and_then(|value| {
                    serde_json::from_value::<RecommendationReply>(value)
                        .map_err(|e| PipelineError::MalformedReply(e.to_string()))
                })
                .and_then(|reply| tracks_from_reply(card, reply));

            match outcome {
                Ok(tracks) => return Ok(tracks),
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::aggregate_cards;
    use crate::canon::minimal_from_text;
    use crate::llm::mock::ScriptedProvider;

    fn card_from(texts: &[&str]) -> HitterCard {
        let records: Vec<_> = texts
            .iter()
            .map(|t| {
                let mut pa = minimal_from_text(t);
                pa.batter = Some("L D".into());
                pa
            })
            .collect();
        aggregate_cards(&records).remove(0)
    }

    fn recommender(provider: Arc<ScriptedProvider>) -> Recommender {
        Recommender::new(RecommenderOptions {
            timeout: Duration::from_secs(2),
            ..RecommenderOptions::default()
        })
        .with_provider(provider)
    }

    #[test]
    fn test_confidence_curves() {
        assert_eq!(deterministic_confidence(0), 0.45);
        assert_eq!(deterministic_confidence(8), 0.65);
        assert_eq!(deterministic_confidence(40), 0.85);
        assert_eq!(sample_aware_confidence(Some(1.0), 1), Some(0.58));
        assert_eq!(sample_aware_confidence(Some(3.0), 12), Some(1.0));
        assert_eq!(sample_aware_confidence(Some(f64::NAN), 3), None);
    }

    #[test]
    fn test_strikeout_heavy_rules() {
        let card = card_from(&["L D strikes out swinging", "L D strikes out looking", "L D walks"]);
        let dev = deterministic_development(&card);
        assert!(dev.recommendations[0].starts_with("Simplify two-strike approach"));
        assert!(dev.recommendations.len() >= MIN_ITEMS && dev.recommendations.len() <= MAX_RULE_ITEMS);

        let exp = deterministic_exploit(&card);
        assert!(exp.recommendations[0].starts_with("Attack up and out of the zone"));
        assert!(exp.recommendations.iter().any(|r| r.starts_with("Challenge in-zone early")));
    }

    #[test]
    fn test_rules_pad_to_minimum() {
        let card = card_from(&["In play. L D singles to left fielder, line drive"]);
        let dev = deterministic_development(&card);
        assert_eq!(dev.recommendations, vec![DEVELOPMENT_FALLBACK; 3]);
        assert!((dev.confidence - 0.475).abs() < 0.006);
    }

    #[test]
    fn test_cap_fill_filters_banned() {
        let items: Vec<String> = vec![
            "Collect more data on this hitter".into(),
            "Stay through the middle".into(),
            "Stay through the middle".into(),
        ];
        let fallback: Vec<String> = vec!["A".into(), "B".into(), "Stay through the middle".into()];
        assert_eq!(
            cap_fill_unique(&items, 3, 6, &fallback),
            vec!["Stay through the middle", "A", "B"]
        );
    }

    #[test]
    fn test_legacy_reply_shape() {
        let card = card_from(&["L D walks"]);
        let reply: RecommendationReply =
            serde_json::from_value(json!({"recommendations": ["Quiet the hands"], "confidence": 0.6}))
                .unwrap();
        let (dev, exp) = tracks_from_reply(&card, reply).unwrap();
        assert_eq!(dev.recommendations[0], "Quiet the hands");
        assert_eq!(dev.recommendations.len(), 3);
        assert_eq!(dev.confidence, 0.35);
        assert_eq!(exp, deterministic_exploit(&card));
    }

    #[test]
    fn test_empty_track_uses_rules_whole() {
        let card = card_from(&["L D walks"]);
        let reply: RecommendationReply = serde_json::from_value(json!({
            "development": {"recommendations": ["Quiet the hands", "Get the foot down early", "Stay tall"], "confidence": 0.8},
            "exploit": {"recommendations": []}
        }))
        .unwrap();
        let (dev, exp) = tracks_from_reply(&card, reply).unwrap();
        assert_eq!(dev.recommendations.len(), 3);
        assert_eq!(exp, deterministic_exploit(&card));
    }

    #[tokio::test]
    async fn test_model_track_scaled_for_one_pa() {
        let provider = Arc::new(ScriptedProvider::ok(vec![
            r#"{"development": {"recommendations": ["Quiet the hands", "Get the foot down early", "Stay tall"], "confidence": 1.0},
                "exploit": {"recommendations": ["Elevate with two strikes", "Pitch backwards", "Shade pull side"], "confidence": 0.95}}"#,
        ]));
        let mut cards = vec![card_from(&["L D strikes out swinging"])];
        let errors = recommender(provider)
            .recommend(&mut cards, &CancellationToken::new())
            .await
            .unwrap();
        assert!(errors.is_empty());
        let dev = cards[0].development.as_ref().unwrap();
        let exp = cards[0].exploit.as_ref().unwrap();
        assert!(dev.confidence <= 0.59);
        assert!(exp.confidence <= 0.59);
        assert_eq!(dev.recommendations[0], "Quiet the hands");
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_with_error() {
        let provider = Arc::new(ScriptedProvider::ok(vec!["I cannot help with that."]));
        let mut cards = vec![card_from(&["L D walks"])];
        let errors = recommender(provider.clone())
            .recommend(&mut cards, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("L D: "));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(cards[0].development, Some(deterministic_development(&cards[0])));
    }

    #[tokio::test]
    async fn test_deterministic_mode_never_calls() {
        let provider = Arc::new(ScriptedProvider::ok(vec!["{}"]));
        let options = RecommenderOptions {
            mode: StageMode::Deterministic,
            ..RecommenderOptions::default()
        };
        let mut cards = vec![card_from(&["L D walks"])];
        let errors = Recommender::new(options)
            .with_provider(provider.clone())
            .recommend(&mut cards, &CancellationToken::new())
            .await
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(provider.call_count(), 0);
        assert!(cards[0].exploit.is_some());
    }
}

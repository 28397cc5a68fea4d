use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, PipelineResult};

/// Terminal outcome of a plate appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaResult {
    Strikeout,
    Walk,
    Gb,
    Fb,
    Ld,
    Double,
    Triple,
    Hr,
    Hbp,
    ReachedOnError,
    FielderChoice,
}

impl PaResult {
    pub const ALL: [PaResult; 11] = [
        PaResult::Strikeout,
        PaResult::Walk,
        PaResult::Gb,
        PaResult::Fb,
        PaResult::Ld,
        PaResult::Double,
        PaResult::Triple,
        PaResult::Hr,
        PaResult::Hbp,
        PaResult::ReachedOnError,
        PaResult::FielderChoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaResult::Strikeout => "strikeout",
            PaResult::Walk => "walk",
            PaResult::Gb => "gb",
            PaResult::Fb => "fb",
            PaResult::Ld => "ld",
            PaResult::Double => "double",
            PaResult::Triple => "triple",
            PaResult::Hr => "hr",
            PaResult::Hbp => "hbp",
            PaResult::ReachedOnError => "reached_on_error",
            PaResult::FielderChoice => "fielder_choice",
        }
    }

    /// Narrative verb a batter-led sentence uses for this outcome.
    pub fn expected_verb(&self) -> Option<&'static str> {
        match self {
            PaResult::Strikeout => Some("strikes out"),
            PaResult::Walk => Some("walks"),
            PaResult::Hbp => Some("is hit by pitch"),
            PaResult::Double => Some("doubles"),
            PaResult::Triple => Some("triples"),
            PaResult::Hr => Some("homers"),
            PaResult::Gb => Some("grounds out"),
            PaResult::Fb => Some("flies out"),
            PaResult::Ld => Some("lines out"),
            PaResult::ReachedOnError => Some("reaches on error"),
            PaResult::FielderChoice => None,
        }
    }

    /// Outs this outcome must add, when the outcome fixes it.
    pub fn fixed_outs(&self) -> Option<u8> {
        match self {
            PaResult::Walk | PaResult::Hbp | PaResult::Hr | PaResult::Double | PaResult::Triple => {
                Some(0)
            }
            PaResult::Strikeout => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchEvent {
    Ball,
    CalledStrike,
    SwingingStrike,
    Foul,
    InPlay,
}

impl PitchEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PitchEvent::Ball => "ball",
            PitchEvent::CalledStrike => "called_strike",
            PitchEvent::SwingingStrike => "swinging_strike",
            PitchEvent::Foul => "foul",
            PitchEvent::InPlay => "in_play",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerActionKind {
    Steal,
    StealHome,
    Advance,
    Score,
}

/// A base-running action stated explicitly in the narrative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerAction {
    pub runner: String,
    pub action: RunnerActionKind,
    /// Destination base, 4 being home
    pub to: u8,
}

/// Structured record for one plate appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateAppearanceCanonical {
    pub pa_result: PaResult,
    pub pitches: Vec<PitchEvent>,
    #[serde(default)]
    pub batter: Option<String>,
    #[serde(default)]
    pub pitcher: Option<String>,
    #[serde(default)]
    pub fielder_num: Option<u8>,
    pub outs_added: u8,
    pub explicit_runner_actions: Vec<RunnerAction>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub confidence: f64,
}

impl PlateAppearanceCanonical {
    pub fn has_in_play(&self) -> bool {
        self.pitches.contains(&PitchEvent::InPlay)
    }
}

/// Partially known record. Heuristic passes and model replies both produce
/// drafts; `overlay` folds them field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateAppearanceDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pa_result: Option<PaResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitches: Option<Vec<PitchEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitcher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fielder_num: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outs_added: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_runner_actions: Option<Vec<RunnerAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PlateAppearanceDraft {
    /// Prefer every field of `top` that is present, falling back to `self`.
    pub fn overlay(self, top: PlateAppearanceDraft) -> PlateAppearanceDraft {
        PlateAppearanceDraft {
            pa_result: top.pa_result.or(self.pa_result),
            pitches: top.pitches.or(self.pitches),
            batter: top.batter.or(self.batter),
            pitcher: top.pitcher.or(self.pitcher),
            fielder_num: top.fielder_num.or(self.fielder_num),
            outs_added: top.outs_added.or(self.outs_added),
            explicit_runner_actions: top.explicit_runner_actions.or(self.explicit_runner_actions),
            notes: top.notes.or(self.notes),
            confidence: top.confidence.or(self.confidence),
        }
    }

    /// Fill gaps in an untrusted model object with this draft's fields. Keys
    /// the model set to a non-null value are left alone.
    pub fn fill_gaps(&self, model: serde_json::Value) -> serde_json::Value {
        let serde_json::Value::Object(mut obj) = model else {
            return model;
        };
        if let Ok(serde_json::Value::Object(ours)) = serde_json::to_value(self) {
            for (key, value) in ours {
                let present = obj.get(&key).is_some_and(|v| !v.is_null());
                if !present {
                    obj.insert(key, value);
                }
            }
        }
        serde_json::Value::Object(obj)
    }

    pub fn is_empty(&self) -> bool {
        *self == PlateAppearanceDraft::default()
    }
}

impl From<PlateAppearanceCanonical> for PlateAppearanceDraft {
    fn from(pa: PlateAppearanceCanonical) -> Self {
        PlateAppearanceDraft {
            pa_result: Some(pa.pa_result),
            pitches: Some(pa.pitches),
            batter: pa.batter,
            pitcher: pa.pitcher,
            fielder_num: pa.fielder_num,
            outs_added: Some(pa.outs_added),
            explicit_runner_actions: Some(pa.explicit_runner_actions),
            notes: Some(pa.notes),
            confidence: Some(pa.confidence),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

/// Situation at the start of a plate appearance. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameContext {
    pub inning: u32,
    pub half: Half,
    pub outs: u8,
    /// Occupied bases (1..=3) to runner identity
    #[serde(default)]
    pub bases: BTreeMap<u8, String>,
    #[serde(default)]
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitcher: Option<String>,
}

impl Default for GameContext {
    fn default() -> Self {
        Self {
            inning: 1,
            half: Half::Top,
            outs: 0,
            bases: BTreeMap::new(),
            score: Score::default(),
            pitcher: None,
        }
    }
}

impl GameContext {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.inning == 0 {
            return Err(PipelineError::Input("game context inning must be positive".into()));
        }
        if self.outs > 2 {
            return Err(PipelineError::Input(format!(
                "game context outs must be 0-2, got {}",
                self.outs
            )));
        }
        if let Some(base) = self.bases.keys().find(|b| !(1..=3).contains(*b)) {
            return Err(PipelineError::Input(format!(
                "game context base {} is not 1-3",
                base
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pa_result_wire_names() {
        let v = serde_json::to_value(PaResult::ReachedOnError).unwrap();
        assert_eq!(v, json!("reached_on_error"));
        for r in PaResult::ALL {
            assert_eq!(serde_json::to_value(r).unwrap(), json!(r.as_str()));
        }
    }

    #[test]
    fn test_fixed_outs() {
        assert_eq!(PaResult::Walk.fixed_outs(), Some(0));
        assert_eq!(PaResult::Strikeout.fixed_outs(), Some(1));
        assert_eq!(PaResult::Gb.fixed_outs(), None);
    }

    #[test]
    fn test_overlay_prefers_top() {
        let base = PlateAppearanceDraft {
            pa_result: Some(PaResult::Fb),
            fielder_num: Some(8),
            batter: Some("A L".into()),
            ..Default::default()
        };
        let top = PlateAppearanceDraft {
            pa_result: Some(PaResult::Ld),
            ..Default::default()
        };
        let merged = base.overlay(top);
        assert_eq!(merged.pa_result, Some(PaResult::Ld));
        assert_eq!(merged.fielder_num, Some(8));
        assert_eq!(merged.batter.as_deref(), Some("A L"));
    }

    #[test]
    fn test_fill_gaps_keeps_model_values() {
        let heuristic = PlateAppearanceDraft {
            batter: Some("L D".into()),
            fielder_num: Some(8),
            ..Default::default()
        };
        let model = json!({ "batter": "X Y", "fielder_num": null, "pa_result": "fb" });
        let merged = heuristic.fill_gaps(model);
        assert_eq!(merged["batter"], json!("X Y"));
        assert_eq!(merged["fielder_num"], json!(8));
        assert_eq!(merged["pa_result"], json!("fb"));
    }

    #[test]
    fn test_context_validation() {
        assert!(GameContext::default().validate().is_ok());
        let bad = GameContext { outs: 3, ..Default::default() };
        assert!(bad.validate().is_err());
        let mut bases = BTreeMap::new();
        bases.insert(4, "X".to_string());
        let bad = GameContext { bases, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_context_bases_serialize_as_string_keys() {
        let mut ctx = GameContext::default();
        ctx.bases.insert(2, "J M".into());
        let v = serde_json::to_value(&ctx).unwrap();
        assert_eq!(v["bases"]["2"], json!("J M"));
        let back: GameContext = serde_json::from_value(v).unwrap();
        assert_eq!(back, ctx);
    }
}

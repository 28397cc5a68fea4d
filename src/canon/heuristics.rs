//! Micro-Heuristics
//!
//! Deterministic extraction from a single segment. `micro_heuristic` only
//! reports what the text states outright and is merged under model output;
//! `minimal_from_text` builds a whole (low-confidence) record for
//! deterministic runs and for offline fallbacks.

use regex::Regex;

use super::types::{
    PaResult, PitchEvent, PlateAppearanceCanonical, PlateAppearanceDraft, RunnerAction,
    RunnerActionKind,
};
use super::validator::validate_value;
use crate::error::{PipelineError, PipelineResult};
use crate::names::{extract_names, normalize_short_name};
use crate::utils::head_chars;

/// Confidence assigned to records built without a model.
pub const DETERMINISTIC_CONFIDENCE: f64 = 0.3;

const NOTE_CHARS: usize = 200;
const RUNNER: &str = r"(?:([A-Z]{1,2}\s+[A-Z]{1,2}|[A-Z][a-z][A-Za-z'.-]*\s+[A-Z][a-z][A-Za-z'.-]*)\s+)?";

lazy_static::lazy_static! {
    static ref FLIES_TO_CENTER: Regex =
        Regex::new(r"(?i)\bfl(?:y|ies) out to (?:the )?center field(?:er)?").unwrap();
    static ref STEAL_OF_HOME: Regex =
        Regex::new(&format!(r"{}(?i:scores? on (?:a )?steal of home)", RUNNER)).unwrap();

    static ref RESULT_RULES: Vec<(Regex, PaResult, u8)> = vec![
        (r"\bhome\s*run|\bhomers?\b|\bhr\b", PaResult::Hr, 0),
        (r"\btriples?\b", PaResult::Triple, 0),
        (r"\bdouble play\b", PaResult::Gb, 2),
        (r"\bdoubles?\b", PaResult::Double, 0),
        (r"\bwalks?\b|\bbases?\s*on\s*balls\b", PaResult::Walk, 0),
        (r"\bhit\s*by\s*(?:a\s*)?pitch\b|\bhbp\b", PaResult::Hbp, 0),
        (r"\breach(?:es|ed)?\s*on\s*(?:an?\s*)?error\b", PaResult::ReachedOnError, 0),
        (r"\bfielder'?s?\s*choice\b", PaResult::FielderChoice, 1),
        (r"\bstrikes?\s*out\b|\bstrikeout\b", PaResult::Strikeout, 1),
        (r"\bfl(?:y|ies)\s*out\b|\bpops?\s*out\b", PaResult::Fb, 1),
        (r"\blines?\s*out\b", PaResult::Ld, 1),
        (r"\bgrounds?\s*out\b|\bground\s*ball\b", PaResult::Gb, 1),
    ]
    .into_iter()
    .map(|(re, result, outs)| (Regex::new(&format!("(?i){}", re)).unwrap(), result, outs))
    .collect();

    static ref SINGLE: Regex = Regex::new(r"(?i)\bsingles?\b").unwrap();
    static ref LINE_DRIVE: Regex = Regex::new(r"(?i)\bline\s*drive\b").unwrap();
    static ref FLY_BALL: Regex = Regex::new(r"(?i)\b(?:fly|pop)\s*ball\b").unwrap();

    static ref FIELDERS: Vec<(Regex, u8)> = vec![
        (r"center\s*field(?:er)?", 8),
        (r"left\s*field(?:er)?", 7),
        (r"right\s*field(?:er)?", 9),
        (r"shortstop", 6),
        (r"second\s*baseman", 4),
        (r"third\s*baseman", 5),
        (r"first\s*baseman", 3),
        (r"pitcher", 1),
        (r"catcher", 2),
    ]
    .into_iter()
    .map(|(pos, n)| (Regex::new(&format!(r"(?i)\bto\s*(?:the\s*)?{}\b", pos)).unwrap(), n))
    .collect();

    static ref PITCH: Regex = Regex::new(
        r"(?i)\b(?:(called\s*strike|strike\s*\d*\s*looking)|(swinging\s*strike|strike\s*\d*\s*swinging)|(foul)|(in\s*play)|(ball))\b"
    ).unwrap();
    static ref NOT_A_PITCH_BALL: Regex = Regex::new(r"(?i)\b(?:ground|fly|line|foul|pop)\s*$").unwrap();

    static ref ADVANCE: Regex =
        Regex::new(&format!(r"{}(?i:advances?\s*to\s*(first|second|third|home))", RUNNER)).unwrap();
    static ref STEAL: Regex =
        Regex::new(&format!(r"{}(?i:steals?\s*(second|third|home))", RUNNER)).unwrap();
    static ref SCORES: Regex = Regex::new(&format!(r"{}(?i:scores)\b", RUNNER)).unwrap();
}

fn base_number(word: &str) -> u8 {
    match word.to_ascii_lowercase().as_str() {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        _ => 4,
    }
}

fn runner_name(caps: &regex::Captures<'_>) -> String {
    caps.get(1)
        .map(|m| normalize_short_name(m.as_str()))
        .unwrap_or_default()
}

/// Explicit, high-precision facts from one segment.
pub fn micro_heuristic(raw: &str) -> PlateAppearanceDraft {
    let mut draft = PlateAppearanceDraft::default();

    if FLIES_TO_CENTER.is_match(raw) {
        draft.pa_result = Some(PaResult::Fb);
        draft.fielder_num = Some(8);
        draft.outs_added = Some(1);
    }

    if let Some(caps) = STEAL_OF_HOME.captures(raw) {
        draft.explicit_runner_actions = Some(vec![RunnerAction {
            runner: runner_name(&caps),
            action: RunnerActionKind::StealHome,
            to: 4,
        }]);
    }

    let names = extract_names(raw);
    draft.batter = names.batter;
    draft.pitcher = names.pitcher;
    draft
}

fn classify_result(text: &str) -> (PaResult, u8) {
    for (re, result, outs) in RESULT_RULES.iter() {
        if re.is_match(text) {
            return (*result, *outs);
        }
    }
    if SINGLE.is_match(text) {
        if LINE_DRIVE.is_match(text) {
            return (PaResult::Ld, 0);
        }
        if FLY_BALL.is_match(text) {
            return (PaResult::Fb, 0);
        }
        return (PaResult::Gb, 0);
    }
    (PaResult::Gb, 0)
}

/// Pitch events in the order they are narrated.
pub fn pitch_sequence(text: &str) -> Vec<PitchEvent> {
    let mut pitches = Vec::new();
    for caps in PITCH.captures_iter(text) {
        let event = if caps.get(1).is_some() {
            PitchEvent::CalledStrike
        } else if caps.get(2).is_some() {
            PitchEvent::SwingingStrike
        } else if caps.get(3).is_some() {
            PitchEvent::Foul
        } else if caps.get(4).is_some() {
            PitchEvent::InPlay
        } else {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if NOT_A_PITCH_BALL.is_match(&text[..start]) {
                continue;
            }
            PitchEvent::Ball
        };
        pitches.push(event);
    }
    pitches
}

fn runner_actions(text: &str) -> Vec<RunnerAction> {
    let mut actions = Vec::new();
    for caps in ADVANCE.captures_iter(text) {
        let to = caps.get(2).map(|m| base_number(m.as_str())).unwrap_or(4);
        actions.push(RunnerAction {
            runner: runner_name(&caps),
            action: if to == 4 { RunnerActionKind::Score } else { RunnerActionKind::Advance },
            to,
        });
    }
    for caps in STEAL.captures_iter(text) {
        let to = caps.get(2).map(|m| base_number(m.as_str())).unwrap_or(4);
        actions.push(RunnerAction {
            runner: runner_name(&caps),
            action: if to == 4 { RunnerActionKind::StealHome } else { RunnerActionKind::Steal },
            to,
        });
    }
    if let Some(caps) = STEAL_OF_HOME.captures(text) {
        actions.push(RunnerAction {
            runner: runner_name(&caps),
            action: RunnerActionKind::StealHome,
            to: 4,
        });
    }
    if !actions.iter().any(|a| a.to == 4) {
        if let Some(caps) = SCORES.captures(text) {
            actions.push(RunnerAction {
                runner: runner_name(&caps),
                action: RunnerActionKind::Score,
                to: 4,
            });
        }
    }
    actions
}

fn note_snippet(raw: &str) -> String {
    head_chars(raw, NOTE_CHARS).to_string()
}

/// A full record from text alone.
pub fn minimal_from_text(raw: &str) -> PlateAppearanceCanonical {
    let (pa_result, outs_added) = classify_result(raw);
    let fielder_num = FIELDERS
        .iter()
        .find(|(re, _)| re.is_match(raw))
        .map(|(_, n)| *n);
    let names = extract_names(raw);

    PlateAppearanceCanonical {
        pa_result,
        pitches: pitch_sequence(raw),
        batter: names.batter,
        pitcher: names.pitcher,
        fielder_num,
        outs_added,
        explicit_runner_actions: runner_actions(raw),
        notes: vec![note_snippet(raw)],
        confidence: DETERMINISTIC_CONFIDENCE,
    }
}

/// Deterministic canonicalization: the text-only record with the explicit
/// micro-heuristic facts folded over it, then validated like any model reply.
pub fn deterministic_record(raw: &str) -> PipelineResult<PlateAppearanceCanonical> {
    let draft = PlateAppearanceDraft::from(minimal_from_text(raw)).overlay(micro_heuristic(raw));
    let value = serde_json::to_value(&draft)
        .map_err(|e| PipelineError::Validation(vec![format!("/ could not be serialized: {}", e)]))?;
    validate_value(&value).map_err(PipelineError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micro_heuristic_center_field_fly() {
        let draft = micro_heuristic("In play. flies out to center fielder.");
        assert_eq!(draft.pa_result, Some(PaResult::Fb));
        assert_eq!(draft.fielder_num, Some(8));
        assert_eq!(draft.outs_added, Some(1));
        assert!(draft.batter.is_none());
    }

    #[test]
    fn test_micro_heuristic_steal_of_home() {
        let draft = micro_heuristic("Ball 2, J M scores on steal of home.");
        let actions = draft.explicit_runner_actions.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, RunnerActionKind::StealHome);
        assert_eq!(actions[0].to, 4);
        assert_eq!(actions[0].runner, "J M");
    }

    #[test]
    fn test_micro_heuristic_names() {
        let draft = micro_heuristic("L D strikes out swinging, J N pitching.");
        assert_eq!(draft.batter.as_deref(), Some("L D"));
        assert_eq!(draft.pitcher.as_deref(), Some("J N"));
        assert!(draft.pa_result.is_none());
    }

    #[test]
    fn test_pitch_sequence_order() {
        let seq = pitch_sequence("Ball 1, Strike 1 looking, Foul, Strike 2 swinging, Ball 2, In play.");
        assert_eq!(
            seq,
            vec![
                PitchEvent::Ball,
                PitchEvent::CalledStrike,
                PitchEvent::Foul,
                PitchEvent::SwingingStrike,
                PitchEvent::Ball,
                PitchEvent::InPlay,
            ]
        );
    }

    #[test]
    fn test_batted_ball_is_not_a_pitch() {
        let seq = pitch_sequence("In play. J M hits a ground ball to shortstop, foul ball earlier");
        assert_eq!(seq, vec![PitchEvent::InPlay, PitchEvent::Foul]);
    }

    #[test]
    fn test_minimal_record_strikeout() {
        let pa = minimal_from_text("L D strikes out swinging, J N pitching.");
        assert_eq!(pa.pa_result, PaResult::Strikeout);
        assert_eq!(pa.outs_added, 1);
        assert_eq!(pa.batter.as_deref(), Some("L D"));
        assert_eq!(pa.pitcher.as_deref(), Some("J N"));
        assert_eq!(pa.confidence, DETERMINISTIC_CONFIDENCE);
    }

    #[test]
    fn test_minimal_record_results() {
        assert_eq!(minimal_from_text("G B walks.").pa_result, PaResult::Walk);
        assert_eq!(minimal_from_text("M R is hit by pitch").pa_result, PaResult::Hbp);
        let dp = minimal_from_text("A B grounds into a double play to shortstop");
        assert_eq!((dp.pa_result, dp.outs_added, dp.fielder_num), (PaResult::Gb, 2, Some(6)));
        let single = minimal_from_text("In play. C D singles on a line drive to left fielder");
        assert_eq!((single.pa_result, single.outs_added), (PaResult::Ld, 0));
        assert_eq!(single.fielder_num, Some(7));
    }

    #[test]
    fn test_runner_actions() {
        let pa = minimal_from_text("J M steals second. K L advances to third. R S scores.");
        let kinds: Vec<_> = pa.explicit_runner_actions.iter().map(|a| (a.action, a.to)).collect();
        assert_eq!(
            kinds,
            vec![
                (RunnerActionKind::Advance, 3),
                (RunnerActionKind::Steal, 2),
                (RunnerActionKind::Score, 4),
            ]
        );
        assert_eq!(pa.explicit_runner_actions[0].runner, "K L");

        let pa = minimal_from_text("J M steals home and scores.");
        assert_eq!(pa.explicit_runner_actions.len(), 1);
        assert_eq!(pa.explicit_runner_actions[0].action, RunnerActionKind::StealHome);
    }

    #[test]
    fn test_note_snippet_is_bounded() {
        let long = "Foul. ".repeat(100);
        let pa = minimal_from_text(&long);
        assert_eq!(pa.notes[0].chars().count(), 200);
    }

    #[test]
    fn test_deterministic_record_is_valid() {
        let pa = deterministic_record("In play. flies out to center fielder.").unwrap();
        assert_eq!(pa.pa_result, PaResult::Fb);
        assert_eq!(pa.fielder_num, Some(8));
        assert_eq!(pa.outs_added, 1);
        assert_eq!(pa.pitches, vec![PitchEvent::InPlay]);
    }
}

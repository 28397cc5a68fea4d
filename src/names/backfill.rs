//! Name backfill over a canonicalized game.
//!
//! Records that came back without a batter or pitcher borrow one from their
//! own segment first, then from neighbouring segments under verb and cue
//! guards. Every identity is finally rewritten to its short form.

use tracing::debug;

use super::extract::{extract_names, normalize_short_name, ExtractedNames, NameSource};
use crate::canon::{PaResult, PlateAppearanceCanonical};
use crate::segment::patterns::contains_verb;

fn neighbor(segments: &[String], index: usize, offset: isize) -> Option<&str> {
    let j = index.checked_add_signed(offset)?;
    segments.get(j).map(String::as_str)
}

fn batter_from_neighbors(result: PaResult, segments: &[String], i: usize) -> Option<String> {
    if let Some(verb) = result.expected_verb() {
        for offset in [1, -1] {
            if let Some(text) = neighbor(segments, i, offset) {
                if let Some(batter) = extract_names(text).batter {
                    if contains_verb(text, verb) {
                        return Some(batter);
                    }
                }
            }
        }
    }

    // "Now batting: J M" just before this play
    let prev = neighbor(segments, i, -1).map(extract_names)?;
    match prev {
        ExtractedNames {
            batter: Some(batter),
            batter_source: Some(NameSource::Cue),
            ..
        } => Some(batter),
        _ => None,
    }
}

fn pitcher_from_neighbors(segments: &[String], i: usize) -> Option<String> {
    [1, -1].into_iter().find_map(|offset| {
        let text = neighbor(segments, i, offset)?;
        if contains_verb(text, "pitching") {
            extract_names(text).pitcher
        } else {
            None
        }
    })
}

/// Fill missing identities in place. `slots[i]` belongs to `segments[i]`;
/// empty slots (failed units) still lend their text to neighbours.
pub fn backfill_identities(
    slots: &mut [Option<PlateAppearanceCanonical>],
    segments: &[String],
    context_pitcher: Option<&str>,
) {
    for (i, slot) in slots.iter_mut().enumerate() {
        let Some(pa) = slot.as_mut() else {
            continue;
        };
        let own = segments.get(i).map(|s| extract_names(s)).unwrap_or_default();

        if pa.batter.is_none() {
            let result = pa.pa_result;
            pa.batter = own.batter.or_else(|| batter_from_neighbors(result, segments, i));
            if let Some(ref batter) = pa.batter {
                debug!("Backfilled batter {} for segment {}", batter, i);
            }
        }
        if pa.pitcher.is_none() {
            pa.pitcher = own
                .pitcher
                .or_else(|| pitcher_from_neighbors(segments, i))
                .or_else(|| context_pitcher.map(str::to_string));
        }

        pa.batter = pa.batter.take().map(|b| normalize_short_name(&b)).filter(|b| !b.is_empty());
        pa.pitcher = pa.pitcher.take().map(|p| normalize_short_name(&p)).filter(|p| !p.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::minimal_from_text;

    fn anonymous(text: &str) -> Option<PlateAppearanceCanonical> {
        let mut pa = minimal_from_text(text);
        pa.batter = None;
        pa.pitcher = None;
        Some(pa)
    }

    fn segs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_own_segment_first() {
        let segments = segs(&["L D strikes out swinging, J N pitching."]);
        let mut slots = vec![anonymous(&segments[0])];
        backfill_identities(&mut slots, &segments, None);
        let pa = slots[0].as_ref().unwrap();
        assert_eq!(pa.batter.as_deref(), Some("L D"));
        assert_eq!(pa.pitcher.as_deref(), Some("J N"));
    }

    #[test]
    fn test_neighbor_needs_expected_verb() {
        let segments = segs(&["Strikeout", "L D strikes out swinging", "G B walks"]);
        let mut slots = vec![anonymous("Strikeout"), None, None];
        backfill_identities(&mut slots, &segments, None);
        assert_eq!(slots[0].as_ref().unwrap().batter.as_deref(), Some("L D"));

        let segments = segs(&["Strikeout", "G B walks"]);
        let mut slots = vec![anonymous("Strikeout"), None];
        backfill_identities(&mut slots, &segments, None);
        assert!(slots[0].as_ref().unwrap().batter.is_none());
    }

    #[test]
    fn test_previous_cue_supplies_batter() {
        let segments = segs(&["Now batting: M R", "Ball 1, In play. grounds out to shortstop"]);
        let mut slots = vec![None, anonymous(&segments[1])];
        backfill_identities(&mut slots, &segments, None);
        assert_eq!(slots[1].as_ref().unwrap().batter.as_deref(), Some("M R"));
    }

    #[test]
    fn test_pitcher_from_neighbor_then_context() {
        let segments = segs(&["A B walks, Hank Wells pitching", "Ball 1, flies out"]);
        let mut slots = vec![None, anonymous(&segments[1])];
        backfill_identities(&mut slots, &segments, Some("Zed Young"));
        assert_eq!(slots[1].as_ref().unwrap().pitcher.as_deref(), Some("H W"));

        let segments = segs(&["Ball 1, flies out"]);
        let mut slots = vec![anonymous(&segments[0])];
        backfill_identities(&mut slots, &segments, Some("Zed Young"));
        assert_eq!(slots[0].as_ref().unwrap().pitcher.as_deref(), Some("Z Y"));
    }

    #[test]
    fn test_model_names_are_normalized() {
        let segments = segs(&["John Miller doubles to left fielder"]);
        let mut pa = minimal_from_text(&segments[0]);
        pa.batter = Some("John Miller".into());
        let mut slots = vec![Some(pa)];
        backfill_identities(&mut slots, &segments, None);
        assert_eq!(slots[0].as_ref().unwrap().batter.as_deref(), Some("J M"));
    }
}

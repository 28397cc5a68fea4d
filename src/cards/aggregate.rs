//! Hitter Aggregation
//!
//! Groups canonical records by batter and computes the per-hitter totals
//! and breakdowns the recommendation tracks read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canon::{PaResult, PitchEvent, PlateAppearanceCanonical};

pub const UNKNOWN_HITTER: &str = "Unknown";
const MAX_SAMPLE_NOTES: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitterTotals {
    pub pas: usize,
    pub pitches_seen: usize,
    /// Share of plate appearances with a ball in play
    pub contact_rate: f64,
    pub strikeout_rate: f64,
    pub walk_rate: f64,
    pub hbp_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattedBall {
    pub gb: usize,
    pub fb: usize,
    pub ld: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerEvents {
    pub double: usize,
    pub triple: usize,
    pub hr: usize,
}

impl PowerEvents {
    pub fn extra_base_hits(&self) -> usize {
        self.double + self.triple + self.hr
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitterBreakdown {
    pub results: BTreeMap<PaResult, usize>,
    pub batted_ball: BattedBall,
    pub power: PowerEvents,
    /// Balls in play by fielder position number
    pub fielders: BTreeMap<u8, usize>,
    pub pitch_mix: BTreeMap<PitchEvent, usize>,
}

impl HitterBreakdown {
    pub fn pitch_count(&self, event: PitchEvent) -> usize {
        self.pitch_mix.get(&event).copied().unwrap_or(0)
    }
}

/// One recommendation list with its (sample-size aware) confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitterCard {
    pub hitter: String,
    pub totals: HitterTotals,
    pub breakdown: HitterBreakdown,
    pub sample_notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development: Option<Recommendations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exploit: Option<Recommendations>,
}

impl HitterCard {
    fn from_records(hitter: String, records: &[&PlateAppearanceCanonical]) -> Self {
        let mut breakdown = HitterBreakdown::default();
        let mut in_play_pas = 0;
        let mut pitches_seen = 0;
        let mut sample_notes = Vec::new();

        for pa in records {
            *breakdown.results.entry(pa.pa_result).or_insert(0) += 1;
            if let Some(fielder) = pa.fielder_num {
                *breakdown.fielders.entry(fielder).or_insert(0) += 1;
            }
            for pitch in &pa.pitches {
                *breakdown.pitch_mix.entry(*pitch).or_insert(0) += 1;
            }
            pitches_seen += pa.pitches.len();
            if pa.has_in_play() {
                in_play_pas += 1;
            }

            match pa.pa_result {
                PaResult::Gb => breakdown.batted_ball.gb += 1,
                PaResult::Fb => breakdown.batted_ball.fb += 1,
                PaResult::Ld => breakdown.batted_ball.ld += 1,
                PaResult::Double => breakdown.power.double += 1,
                PaResult::Triple => breakdown.power.triple += 1,
                PaResult::Hr => breakdown.power.hr += 1,
                _ => {}
            }

            if let Some(note) = pa.notes.first() {
                sample_notes.push(note.clone());
            }
        }
        sample_notes.truncate(MAX_SAMPLE_NOTES);

        let pas = records.len();
        let rate = |count: usize| if pas == 0 { 0.0 } else { count as f64 / pas as f64 };
        let count = |result: PaResult| breakdown.results.get(&result).copied().unwrap_or(0);
        let totals = HitterTotals {
            pas,
            pitches_seen,
            contact_rate: rate(in_play_pas),
            strikeout_rate: rate(count(PaResult::Strikeout)),
            walk_rate: rate(count(PaResult::Walk)),
            hbp_rate: rate(count(PaResult::Hbp)),
        };

        HitterCard {
            hitter,
            totals,
            breakdown,
            sample_notes,
            development: None,
            exploit: None,
        }
    }
}

/// Cards per batter, most plate appearances first, ties by name.
pub fn aggregate_cards(records: &[PlateAppearanceCanonical]) -> Vec<HitterCard> {
    let mut by_hitter: BTreeMap<String, Vec<&PlateAppearanceCanonical>> = BTreeMap::new();
    for pa in records {
        let name = pa
            .batter
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(UNKNOWN_HITTER);
        by_hitter.entry(name.to_string()).or_default().push(pa);
    }

    let mut cards: Vec<HitterCard> = by_hitter
        .into_iter()
        .map(|(hitter, list)| HitterCard::from_records(hitter, &list))
        .collect();
    cards.sort_by(|a, b| {
        b.totals
            .pas
            .cmp(&a.totals.pas)
            .then_with(|| a.hitter.cmp(&b.hitter))
    });
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::minimal_from_text;

    fn pa(batter: Option<&str>, text: &str) -> PlateAppearanceCanonical {
        let mut pa = minimal_from_text(text);
        pa.batter = batter.map(str::to_string);
        pa
    }

    #[test]
    fn test_groups_and_orders() {
        let records = vec![
            pa(Some("L D"), "L D strikes out swinging"),
            pa(Some("G B"), "G B walks"),
            pa(Some("L D"), "Ball 1, In play. L D doubles to left fielder"),
            pa(None, "In play. flies out to center fielder"),
            pa(Some("  "), "Strike 1 swinging, In play. grounds out to shortstop"),
        ];
        let cards = aggregate_cards(&records);
        let names: Vec<&str> = cards.iter().map(|c| c.hitter.as_str()).collect();
        assert_eq!(names, vec!["L D", "Unknown", "G B"]);
        assert_eq!(cards[1].totals.pas, 2);
    }

    #[test]
    fn test_totals_and_breakdown() {
        let records = vec![
            pa(Some("L D"), "L D strikes out swinging"),
            pa(Some("L D"), "Ball 1, In play. L D doubles to left fielder"),
            pa(Some("L D"), "In play. L D grounds out to shortstop"),
            pa(Some("L D"), "L D walks"),
        ];
        let card = &aggregate_cards(&records)[0];
        assert_eq!(card.totals.pas, 4);
        assert!((card.totals.contact_rate - 0.5).abs() < 1e-9);
        assert!((card.totals.strikeout_rate - 0.25).abs() < 1e-9);
        assert!((card.totals.walk_rate - 0.25).abs() < 1e-9);
        assert_eq!(card.breakdown.power.double, 1);
        assert_eq!(card.breakdown.batted_ball.gb, 1);
        assert_eq!(card.breakdown.fielders.get(&6), Some(&1));
        assert_eq!(card.breakdown.fielders.get(&7), Some(&1));
        assert_eq!(card.breakdown.pitch_count(PitchEvent::InPlay), 2);
        assert_eq!(card.sample_notes.len(), 4);
    }

    #[test]
    fn test_sample_notes_capped() {
        let records: Vec<_> = (0..9).map(|_| pa(Some("G B"), "G B walks")).collect();
        assert_eq!(aggregate_cards(&records)[0].sample_notes.len(), MAX_SAMPLE_NOTES);
    }
}

//! Identity extraction from narrative text.
//!
//! Names are matched case-sensitively (initials or capitalized words) while the
//! verbs and cues around them are not, so "so he walks" never yields a batter.

use regex::{Captures, Regex};

use crate::segment::patterns::{BATTER_CUES, OUTCOME_VERBS};

const SPACED: &str = r"\b([A-Z]{1,2})\s+([A-Z]{1,2})\b";
const COMPACT: &str = r"\b([A-Z])([A-Z])\b";
/// A first token may be an abbreviation ("J. Miller") but a longer word
/// ending in a period closes the previous sentence ("Strikeout. JM").
const FULL: &str = r"\b([A-Z](?:[A-Za-z'-]+|\.))\s+([A-Z][A-Za-z'-]+)\b";

/// How a batter identity was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    /// Followed by an outcome verb ("L D strikes out")
    Verb,
    /// Announced by a batting cue ("Now batting: J M", "G B steps in")
    Cue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedNames {
    pub batter: Option<String>,
    pub batter_source: Option<NameSource>,
    pub pitcher: Option<String>,
}

fn join(words: &[&str]) -> String {
    words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|")
}

fn followed_by(name: &str, words: &str) -> Regex {
    Regex::new(&format!(r"{}\s+(?i:{})", name, words)).unwrap()
}

fn cue_then(name: &str) -> Regex {
    Regex::new(&format!(r"(?i:now batting|batting):?-?\s+{}", name)).unwrap()
}

lazy_static::lazy_static! {
    /// Batter patterns in priority order.
    static ref BATTER_PATTERNS: Vec<(Regex, NameSource)> = {
        let verbs = join(OUTCOME_VERBS);
        let cues = join(BATTER_CUES);
        vec![
            (followed_by(FULL, &verbs), NameSource::Verb),
            (followed_by(FULL, &cues), NameSource::Cue),
            (followed_by(SPACED, &verbs), NameSource::Verb),
            (followed_by(COMPACT, &verbs), NameSource::Verb),
            (followed_by(SPACED, &cues), NameSource::Cue),
            (followed_by(COMPACT, &cues), NameSource::Cue),
            (cue_then(FULL), NameSource::Cue),
            (cue_then(SPACED), NameSource::Cue),
        ]
    };
    static ref PITCHER_PATTERNS: Vec<Regex> = vec![
        followed_by(FULL, "pitching"),
        followed_by(SPACED, "pitching"),
        followed_by(COMPACT, "pitching"),
    ];
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn initials(caps: &Captures<'_>) -> Option<String> {
    let first = caps.get(1)?.as_str().chars().next()?;
    let last = caps.get(2)?.as_str().chars().next()?;
    Some(format!("{} {}", first.to_ascii_uppercase(), last.to_ascii_uppercase()))
}

/// Batter and pitcher identities mentioned in one piece of text, as spaced initials.
pub fn extract_names(text: &str) -> ExtractedNames {
    let text = WHITESPACE.replace_all(text, " ");
    let text = text.trim();

    let mut names = ExtractedNames::default();
    for (re, source) in BATTER_PATTERNS.iter() {
        if let Some(name) = re.captures(text).as_ref().and_then(initials) {
            names.batter = Some(name);
            names.batter_source = Some(*source);
            break;
        }
    }
    names.pitcher = PITCHER_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).as_ref().and_then(initials));
    names
}

/// Rewrite a name to its short form: initials stay initials (spaced and
/// uppercased), full names reduce to first and last initial.
pub fn normalize_short_name(name: &str) -> String {
    let collapsed = WHITESPACE.replace_all(name, " ");
    let t = collapsed.trim();
    let letters: Vec<&str> = t
        .split(' ')
        .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
        .collect();

    match letters.as_slice() {
        [a, b] if a.len() == 1 && b.len() == 1 => {
            format!("{} {}", a.to_ascii_uppercase(), b.to_ascii_uppercase())
        }
        [pair] if pair.len() == 2 && pair.chars().all(|c| c.is_ascii_alphabetic()) => {
            let mut chars = pair.chars();
            match (chars.next(), chars.next()) {
                (Some(a), Some(b)) => format!("{} {}", a.to_ascii_uppercase(), b.to_ascii_uppercase()),
                _ => t.to_string(),
            }
        }
        [first, .., last] => {
            let f = first.chars().find(|c| c.is_ascii_alphabetic());
            let l = last.chars().find(|c| c.is_ascii_alphabetic());
            match (f, l) {
                (Some(f), Some(l)) => format!("{} {}", f.to_ascii_uppercase(), l.to_ascii_uppercase()),
                _ => t.to_string(),
            }
        }
        _ => t.to_string(),
    }
}

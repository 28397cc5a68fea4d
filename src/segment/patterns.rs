//! Play-by-Play Patterns
//!
//! Named predicates over narrative text. Each one encodes scorer vocabulary
//! (result summaries, batter verbs, batting cues, substitutions) and is
//! tested on its own.

use regex::Regex;
use std::collections::HashMap;

/// Verbs a batter-led sentence uses for a terminal outcome.
pub const OUTCOME_VERBS: &[&str] = &[
    "strikes out",
    "walks",
    "is hit by pitch",
    "singles",
    "doubles",
    "triples",
    "homers",
    "reaches on error",
    "grounds out",
    "flies out",
    "lines out",
];

/// Phrases announcing the next batter.
pub const BATTER_CUES: &[&str] = &[
    "now batting",
    "batting",
    "at bat",
    "at the plate",
    "to bat",
    "steps in",
    "leading off",
    "leads off",
    "to the plate",
];

/// An identity token pair: initials ("L D", "LD" is handled elsewhere) or
/// capitalized words ("John Miller").
pub const NAME_PAIR: &str = r"(?:[A-Z]{1,2}|[A-Z][a-z][A-Za-z'.-]*)\s+(?:[A-Z]{1,2}|[A-Z][a-z][A-Za-z'.-]*)";

fn alternation(words: &[&str]) -> String {
    words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|")
}

lazy_static::lazy_static! {
    static ref INNING_HEADER: Regex =
        Regex::new(r"(?i)\b(?:top|bottom)\s+\d+(?:st|nd|rd|th)?\b(?:[ \t]*-[ \t]*[^\n.]+)?").unwrap();
    static ref SCOREBOARD: Regex = Regex::new(r"[A-Z]{2,}\s*\d+\s*-\s*[A-Z]{2,}\s*\d+").unwrap();
    static ref LINEUP_CHANGED: Regex = Regex::new(r"([^.!?\s])\s+(Lineup changed:)").unwrap();
    static ref PIPE: Regex = Regex::new(r"\.?[ \t]*\|[ \t]*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    static ref SUMMARY_LED: Regex = Regex::new(
        r"(?i)^(strikeout|fly out|ground out|line out|walk|hit by pitch|single|double|triple|home run|reach(?:es)? on error)\b"
    ).unwrap();
    static ref NAME_LED: Regex = Regex::new(&format!(
        r"^\s*{}\s+(?i:{}|{})",
        NAME_PAIR,
        alternation(OUTCOME_VERBS),
        alternation(BATTER_CUES)
    )).unwrap();
    static ref IN_PLAY_LED: Regex = Regex::new(r"(?i)^\s*in play\b").unwrap();
    static ref PITCHING_CHANGE: Regex = Regex::new(&format!(
        r"(?i:lineup changed:)\s*[^.]*?(?i:in at pitcher)[^.]*\.?|\b{}\s+(?i:in at pitcher)[^.]*\.?",
        NAME_PAIR
    )).unwrap();
    static ref VERB_PATTERNS: HashMap<&'static str, Regex> = OUTCOME_VERBS
        .iter()
        .chain(std::iter::once(&"pitching"))
        .map(|v| (*v, Regex::new(&format!(r"(?i)\b{}\b", regex::escape(v))).unwrap()))
        .collect();
    static ref OUTCOME_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:strike\w*|walk\w*|ground\w*|fl(?:y|ies)\b|line(?:s|d)?\b|line drive|single\w*|double\w*|triple\w*|home run|homers?\b|hit by pitch|in play|reach(?:es|ed)? on error)"
    ).unwrap();
}

/// Remove inning headers ("Top 5th - Bridgewater") and score lines ("BRDG 8 - FRNT 2").
pub fn strip_noise(text: &str) -> String {
    let without_headers = INNING_HEADER.replace_all(text, "");
    SCOREBOARD.replace_all(&without_headers, "").trim().to_string()
}

/// Line-break, separator and whitespace normalization. Newlines survive so
/// that one-PA-per-line logs keep their boundaries.
pub fn normalize_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = INNING_HEADER.replace_all(&text, "");
    let text = SCOREBOARD.replace_all(&text, "");
    let text = PIPE.replace_all(&text, ". ");
    let text = LINEUP_CHANGED.replace_all(&text, "$1. $2");
    text.split('\n')
        .map(|line| WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split one line after sentence punctuation followed by whitespace.
pub fn split_sentences(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    let piece = line[start..i + c.len_utf8()].trim();
                    if !piece.is_empty() {
                        out.push(piece.to_string());
                    }
                    start = j;
                }
            }
        }
    }
    let tail = line[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

/// Sentence and newline tokens of normalized text.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized.split('\n').flat_map(split_sentences).collect()
}

/// Begins with a result summary such as "Strikeout" or "Fly Out".
pub fn is_summary_led(token: &str) -> bool {
    SUMMARY_LED.is_match(token.trim_start())
}

/// The verb a narrative sentence would use for the summary a token starts with.
pub fn summary_verb(token: &str) -> Option<&'static str> {
    let caps = SUMMARY_LED.captures(token.trim_start())?;
    let word = caps.get(1)?.as_str().to_lowercase();
    let verb = match word.as_str() {
        "strikeout" => "strikes out",
        "fly out" => "flies out",
        "ground out" => "grounds out",
        "line out" => "lines out",
        "walk" => "walks",
        "hit by pitch" => "is hit by pitch",
        "single" => "singles",
        "double" => "doubles",
        "triple" => "triples",
        "home run" => "homers",
        _ => "reaches on error",
    };
    Some(verb)
}

/// Begins with an identity followed by an outcome verb or batting cue.
pub fn is_name_led(token: &str) -> bool {
    NAME_LED.is_match(token)
}

pub fn is_in_play_led(token: &str) -> bool {
    IN_PLAY_LED.is_match(token)
}

/// Byte range of a pitching substitution inside a token, if any.
pub fn find_pitching_change(token: &str) -> Option<(usize, usize)> {
    PITCHING_CHANGE.find(token).map(|m| (m.start(), m.end()))
}

pub fn has_outcome_keyword(text: &str) -> bool {
    OUTCOME_KEYWORD.is_match(text)
}

/// Whole-word, case-insensitive search for a verb phrase. Outcome verbs and
/// "pitching" use precompiled patterns; anything else is a plain substring
/// search on lowercased text.
pub fn contains_verb(text: &str, verb: &str) -> bool {
    match VERB_PATTERNS.get(verb) {
        Some(re) => re.is_match(text),
        None => text.to_lowercase().contains(&verb.to_lowercase()),
    }
}

/// Some sentence of the segment already names the batter with a verb or cue.
pub fn holds_narrative(segment: &str) -> bool {
    split_sentences(segment).iter().any(|s| is_name_led(s))
}

/// A summary-led text followed by a narrative sentence of the same play:
/// the narrative must literally contain the summary's expected verb.
pub fn describes_same_play(summary: &str, narrative: &str) -> bool {
    is_name_led(narrative)
        && summary_verb(summary).is_some_and(|verb| contains_verb(narrative, verb))
}

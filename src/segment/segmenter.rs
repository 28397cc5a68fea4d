//! Deterministic Segmenter
//!
//! A single pass over sentence tokens with one open segment at a time.
//! Summary-led and name-led tokens start plate appearances, everything else
//! continues the open one, and pitching substitutions ride along with the
//! next plate appearance.

use super::patterns::{
    describes_same_play, find_pitching_change, has_outcome_keyword, is_in_play_led, is_name_led,
    is_summary_led, normalize_text, split_sentences, strip_noise, tokenize,
};

struct OpenSegment {
    text: String,
    /// Summary-led and still waiting for its narrative sentence
    awaiting_narrative: bool,
}

#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<String>,
    current: Option<OpenSegment>,
    pending_prefix: Option<String>,
}

impl SegmentBuilder {
    fn take_prefixed(&mut self, token: &str) -> String {
        match self.pending_prefix.take() {
            Some(prefix) => format!("{} {}", prefix, token),
            None => token.to_string(),
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.current.take() {
            let text = open.text.trim().to_string();
            if !text.is_empty() {
                self.segments.push(text);
            }
        }
    }

    fn open(&mut self, token: &str) {
        self.close();
        let text = self.take_prefixed(token);
        self.current = Some(OpenSegment {
            awaiting_narrative: is_summary_led(token),
            text,
        });
    }

    fn hold_substitution(&mut self, change: &str) {
        self.pending_prefix = Some(match self.pending_prefix.take() {
            Some(prev) => format!("{} {}", prev, change),
            None => change.to_string(),
        });
    }

    fn accept(&mut self, token: &str) {
        let summary = is_summary_led(token);
        let named = is_name_led(token);

        if summary || named {
            let merge = match &self.current {
                Some(open) => named && open.awaiting_narrative && describes_same_play(&open.text, token),
                None => false,
            };
            if merge {
                let addition = self.take_prefixed(token);
                if let Some(open) = self.current.as_mut() {
                    open.text.push(' ');
                    open.text.push_str(&addition);
                    open.awaiting_narrative = false;
                }
            } else {
                self.open(token);
            }
            return;
        }

        match self.current.as_mut() {
            Some(open) => {
                open.text.push(' ');
                open.text.push_str(token);
            }
            // Stray text before any plate appearance, unless the ball is in play
            None if is_in_play_led(token) => self.open(token),
            None => {}
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.close();
        self.segments
            .into_iter()
            .filter(|s| has_outcome_keyword(s))
            .collect()
    }
}

/// Split raw play-by-play text into ordered plate appearance segments.
/// Pure: identical input always yields the identical list.
pub fn deterministic_segment(raw: &str) -> Vec<String> {
    let normalized = normalize_text(raw);
    let mut builder = SegmentBuilder::default();

    for token in tokenize(&normalized) {
        let token = strip_noise(&token);
        if token.is_empty() {
            continue;
        }

        let Some((start, end)) = find_pitching_change(&token) else {
            builder.accept(&token);
            continue;
        };

        let before = token[..start].trim();
        for piece in split_sentences(before) {
            builder.accept(&piece);
        }
        builder.hold_substitution(token[start..end].trim());
        let after = token[end..].trim();
        if !after.is_empty() {
            builder.accept(after);
        }
    }

    builder.finish()
}
